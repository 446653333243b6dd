//! Codificación de estados y anchos de bus.

use serde::Serialize;
use std::{
    fmt::{self, Display},
    str::FromStr,
};
use thiserror::Error;

/// Esquema de codificación del registro de estado.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Sigue la anotación de codificación preferida, o binaria.
    Auto,
    Binary,
    OneHot,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Auto
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown state encoding `{0}`, expected `auto`, `binary` or `one-hot`")]
pub struct UnknownEncoding(String);

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Ok(Encoding::Auto),
            "binary" => Ok(Encoding::Binary),
            "one-hot" | "onehot" | "one_hot" => Ok(Encoding::OneHot),
            _ => Err(UnknownEncoding(name.to_owned())),
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Encoding::Auto => "auto",
            Encoding::Binary => "binary",
            Encoding::OneHot => "one-hot",
        })
    }
}

/// Códigos asignados a cada estado, en orden de identificador.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateCodes {
    encoding: Encoding,
    count: usize,
}

impl StateCodes {
    /// `Encoding::Auto` debe resolverse antes; aquí equivale a binaria.
    pub fn assign(encoding: Encoding, count: usize) -> Self {
        let encoding = match encoding {
            Encoding::OneHot => Encoding::OneHot,
            _ => Encoding::Binary,
        };

        StateCodes { encoding, count }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn width(&self) -> u32 {
        match self.encoding {
            Encoding::OneHot => (self.count as u32).max(1),
            _ => index_width(self.count as u128),
        }
    }

    /// Literal de Verilog del código de un estado.
    pub fn literal(&self, index: usize) -> String {
        let width = self.width();
        match self.encoding {
            Encoding::OneHot => {
                let bits: String = (0..width as usize)
                    .rev()
                    .map(|bit| if bit == index { '1' } else { '0' })
                    .collect();

                format!("{}'b{}", width, bits)
            }

            _ => format!("{}'d{}", width, index),
        }
    }
}

/// Bits necesarios para representar `max`.
pub fn value_width(max: u128) -> u32 {
    (u128::BITS - max.leading_zeros()).max(1)
}

/// Bits necesarios para distinguir `count` valores.
pub fn index_width(count: u128) -> u32 {
    value_width(count.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("One-Hot".parse(), Ok(Encoding::OneHot));
        assert_eq!("binary".parse(), Ok(Encoding::Binary));
        assert!("gray".parse::<Encoding>().is_err());
    }

    #[test]
    fn widths() {
        assert_eq!(index_width(1), 1);
        assert_eq!(index_width(2), 1);
        assert_eq!(index_width(5), 3);
        assert_eq!(index_width(8), 3);
        assert_eq!(index_width(9), 4);
        assert_eq!(value_width(0), 1);
        assert_eq!(value_width(255), 8);
        assert_eq!(value_width(256), 9);
    }

    #[test]
    fn binary_literals() {
        let codes = StateCodes::assign(Encoding::Binary, 6);
        assert_eq!(codes.width(), 3);
        assert_eq!(codes.literal(0), "3'd0");
        assert_eq!(codes.literal(5), "3'd5");
    }

    #[test]
    fn one_hot_literals() {
        let codes = StateCodes::assign(Encoding::OneHot, 4);
        assert_eq!(codes.width(), 4);
        assert_eq!(codes.literal(0), "4'b0001");
        assert_eq!(codes.literal(3), "4'b1000");
    }
}
