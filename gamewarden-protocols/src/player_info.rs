//! Player info block, the tabular format of `admin.listPlayers` replies and
//! end-of-round score events.
//!
//! `<field count> <field names...> <row count> <values...>`

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum BlockError {
    #[error("Expected a count at word {index}, found '{found}'")]
    InvalidCount { index: usize, found: String },
    #[error("Block truncated: needs {expected} words, has {found}")]
    Truncated { expected: usize, found: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfoBlock {
    fields: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// One row of a [`PlayerInfoBlock`].
#[derive(Debug, Clone, Copy)]
pub struct PlayerInfo<'a> {
    fields: &'a [String],
    values: &'a [String],
}

impl<'a> PlayerInfo<'a> {
    pub fn get(&self, field: &str) -> Option<&'a str> {
        let idx = self.fields.iter().position(|f| f == field)?;
        self.values.get(idx).map(String::as_str)
    }

    pub fn name(&self) -> Option<&'a str> {
        self.get("name")
    }
}

fn count(words: &[String], index: usize) -> Result<usize, BlockError> {
    let word = words.get(index).ok_or(BlockError::Truncated {
        expected: index + 1,
        found: words.len(),
    })?;
    word.parse().map_err(|_| BlockError::InvalidCount {
        index,
        found: word.clone(),
    })
}

impl PlayerInfoBlock {
    pub fn parse(words: &[String]) -> Result<Self, BlockError> {
        let num_fields = count(words, 0)?;
        let fields_end = 1 + num_fields;
        if words.len() < fields_end {
            return Err(BlockError::Truncated {
                expected: fields_end,
                found: words.len(),
            });
        }
        let fields = words[1..fields_end].to_vec();

        let num_rows = count(words, fields_end)?;
        let values_start = fields_end + 1;
        let expected = values_start + num_rows * num_fields;
        if words.len() < expected {
            return Err(BlockError::Truncated {
                expected,
                found: words.len(),
            });
        }

        let rows = if num_fields == 0 {
            vec![Vec::new(); num_rows]
        } else {
            words[values_start..expected]
                .chunks(num_fields)
                .map(<[String]>::to_vec)
                .collect()
        };
        Ok(Self { fields, rows })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PlayerInfo<'_>> {
        self.rows.iter().map(move |values| PlayerInfo {
            fields: &self.fields,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split(' ').map(String::from).collect()
    }

    #[test]
    fn test_parse_list_players() {
        let block = PlayerInfoBlock::parse(&words(
            "4 name guid teamId squadId 2 Joe EA_1 1 2 Ann EA_2 2 0",
        ))
        .unwrap();
        assert_eq!(block.len(), 2);
        let rows: Vec<_> = block.iter().collect();
        assert_eq!(rows[0].name(), Some("Joe"));
        assert_eq!(rows[1].get("teamId"), Some("2"));
        assert_eq!(rows[1].get("kills"), None);
    }

    #[test]
    fn test_empty_server() {
        let block = PlayerInfoBlock::parse(&words("2 name guid 0")).unwrap();
        assert!(block.is_empty());
        assert_eq!(block.fields(), ["name".to_string(), "guid".to_string()]);
    }

    #[test]
    fn test_truncated_block() {
        assert_eq!(
            PlayerInfoBlock::parse(&words("2 name guid 1 Joe")),
            Err(BlockError::Truncated {
                expected: 6,
                found: 5
            })
        );
        assert!(matches!(
            PlayerInfoBlock::parse(&words("x")),
            Err(BlockError::InvalidCount { index: 0, .. })
        ));
    }
}
