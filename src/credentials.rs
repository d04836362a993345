//! Per-request credential iteration

use log::trace;

/// Hands out a provider's credentials first to last, once each.
///
/// A pool is built fresh for every request and never wraps around, so
/// concurrent requests cannot skip or repeat each other's keys.
#[derive(Debug, Clone)]
pub struct CredentialPool<'a>
{   credentials: &'a [String]
  , cursor: usize
}

impl<'a> CredentialPool<'a>
{   pub fn new(credentials: &'a [String]) -> Self
    {   CredentialPool
        {   credentials
          , cursor: 0
        }
    }

    pub fn is_empty(&self) -> bool
    {   self.credentials.is_empty()
    }

    pub fn len(&self) -> usize
    {   self.credentials.len()
    }

    /// Credentials not handed out yet.
    pub fn remaining(&self) -> usize
    {   self.credentials.len() - self.cursor
    }
}

impl<'a> Iterator for CredentialPool<'a>
{   type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item>
    {   let key = self.credentials.get(self.cursor)?;
        let index = self.cursor;
        self.cursor += 1;
        trace!("Handing out credential {} ({})", index, mask_credential(key));
        Some((index, key.as_str()))
    }
}

/// Render a secret as its last four characters, e.g. `...abcd`.
/// Secrets of four characters or fewer are masked completely.
pub fn mask_credential(credential: &str) -> String
{   if credential.chars().count() <= 4
    {   return "****".to_string();
    }
    let tail: String = credential
      .chars()
      .rev()
      .take(4)
      .collect::<Vec<_>>()
      .into_iter()
      .rev()
      .collect();
    format!("...{}", tail)
}
