//! Per-provider model ladder

/// Ordered models for one provider, most preferred first.
///
/// The configured order is fixed; a request may only pull its hinted
/// model to the front for its own walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLadder<'a>
{   rungs: Vec<&'a str>
}

impl<'a> ModelLadder<'a>
{   pub fn new(models: &'a [String]) -> Self
    {   ModelLadder
        {   rungs: models.iter().map(String::as_str).collect()
        }
    }

    /// Same ladder with `hint` moved to the top when present.
    pub fn with_hint(models: &'a [String], hint: Option<&str>) -> Self
    {   let mut ladder = Self::new(models);
        if let Some(hint) = hint
        {   if let Some(pos) = ladder.rungs.iter().position(|m| *m == hint)
            {   let hinted = ladder.rungs.remove(pos);
                ladder.rungs.insert(0, hinted);
            }
        }
        ladder
    }

    pub fn rungs(&self) -> &[&'a str]
    {   &self.rungs
    }

    pub fn len(&self) -> usize
    {   self.rungs.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.rungs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_
    {   self.rungs.iter().copied()
    }
}
