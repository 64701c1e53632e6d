//! Bulk place-name translations.
//!
//! The input is a tab-separated file with one `code<TAB>name` pair per line.
//! Lines with any other number of fields are ignored.

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
  pub code: String,
  pub name: String,
}

/// Counts returned by [`crate::store::QuizStore::apply_translations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TranslationReport {
  /// Known places whose name changed.
  pub updated:   usize,
  /// Known places that already had the translated name.
  pub unchanged: usize,
  /// Unknown codes applied through the code-or-name fallback.
  pub fallback:  usize,
  /// Unknown codes the fallback did not match either.
  pub unmatched: usize,
}

/// Parse a tab-separated translations file.
pub fn parse_translations(input: &str) -> Vec<Translation> {
  input
    .lines()
    .enumerate()
    .filter_map(|(index, line)| {
      let fields: Vec<&str> = line.split('\t').collect();
      match fields.as_slice() {
        [code, name] => Some(Translation {
          code: (*code).to_owned(),
          name: (*name).to_owned(),
        }),
        _ => {
          if !line.trim().is_empty() {
            warn!(line = index + 1, "skipping translation row with {} fields", fields.len());
          }
          None
        }
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_pairs_and_skips_malformed_rows() {
    let input = "cz\tČesko\r\nsk\tSlovensko\n\nbroken\nat\tRakousko\textra\n";
    let parsed = parse_translations(input);

    assert_eq!(parsed, vec![
      Translation { code: "cz".into(), name: "Česko".into() },
      Translation { code: "sk".into(), name: "Slovensko".into() },
    ]);
  }

  #[test]
  fn empty_name_is_still_a_pair() {
    let parsed = parse_translations("xx\t\n");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].name, "");
  }
}
