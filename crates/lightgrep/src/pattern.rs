//! Keyword syntax
//!
//! Non-fixed-string keywords support a small pattern language:
//!
//! | syntax      | meaning                                    |
//! |-------------|--------------------------------------------|
//! | `c`         | the literal character `c`                  |
//! | `.`         | any one character in the keyword encoding  |
//! | `x?`        | zero or one `x`                            |
//! | `x*`        | zero or more `x`                           |
//! | `x+`        | one or more `x`                            |
//! | `\xHH`      | the raw byte `0xHH`, not encoded           |
//! | `\t \n \r \0 \f \v` | the usual control characters       |
//! | `\` + punctuation | that punctuation character literally |

use crate::error::{LightgrepError, Result};

/// Single matchable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Atom {
    /// Character, encoded at compile time
    Char(char),
    /// Raw byte, bypasses the encoding
    Byte(u8),
    /// Any one character
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repeat {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Repeat {
    fn can_skip(self) -> bool {
        matches!(self, Repeat::ZeroOrOne | Repeat::ZeroOrMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Item {
    pub atom: Atom,
    pub repeat: Repeat,
}

/// Parse keyword text into a sequence of items
pub(crate) fn parse(keyword: &str, fixed_string: bool) -> Result<Vec<Item>> {
    if keyword.is_empty() {
        return Err(LightgrepError::keyword(keyword, "empty keyword"));
    }

    let items = if fixed_string {
        keyword
            .chars()
            .map(|c| Item {
                atom: Atom::Char(c),
                repeat: Repeat::One,
            })
            .collect()
    } else {
        parse_pattern(keyword)?
    };

    if items.iter().all(|item| item.repeat.can_skip()) {
        return Err(LightgrepError::keyword(
            keyword,
            "keyword matches the empty string",
        ));
    }
    Ok(items)
}

fn parse_pattern(keyword: &str) -> Result<Vec<Item>> {
    let mut items: Vec<Item> = Vec::new();
    let mut chars = keyword.chars().enumerate().peekable();
    // whether the last item may still take a quantifier
    let mut quantifiable = false;

    while let Some((pos, c)) = chars.next() {
        let atom = match c {
            '?' | '*' | '+' => {
                let last = match items.last_mut() {
                    Some(last) if quantifiable => last,
                    _ => {
                        return Err(LightgrepError::keyword(
                            keyword,
                            format!("dangling quantifier '{}' at position {}", c, pos),
                        ))
                    }
                };
                last.repeat = match c {
                    '?' => Repeat::ZeroOrOne,
                    '*' => Repeat::ZeroOrMore,
                    _ => Repeat::OneOrMore,
                };
                quantifiable = false;
                continue;
            }
            '.' => Atom::Any,
            '\\' => {
                let (_, escaped) = chars.next().ok_or_else(|| {
                    LightgrepError::keyword(keyword, format!("trailing backslash at position {}", pos))
                })?;
                match escaped {
                    'x' => {
                        let mut value = 0u8;
                        for _ in 0..2 {
                            let digit = chars
                                .next()
                                .and_then(|(_, d)| d.to_digit(16))
                                .ok_or_else(|| {
                                    LightgrepError::keyword(
                                        keyword,
                                        format!("bad hex escape at position {}", pos),
                                    )
                                })?;
                            value = (value << 4) | digit as u8;
                        }
                        Atom::Byte(value)
                    }
                    't' => Atom::Char('\t'),
                    'n' => Atom::Char('\n'),
                    'r' => Atom::Char('\r'),
                    '0' => Atom::Char('\0'),
                    'f' => Atom::Char('\x0C'),
                    'v' => Atom::Char('\x0B'),
                    p if p.is_ascii_punctuation() => Atom::Char(p),
                    other => {
                        return Err(LightgrepError::keyword(
                            keyword,
                            format!("unknown escape '\\{}' at position {}", other, pos),
                        ))
                    }
                }
            }
            other => Atom::Char(other),
        };
        items.push(Item {
            atom,
            repeat: Repeat::One,
        });
        quantifiable = true;
    }

    Ok(items)
}
