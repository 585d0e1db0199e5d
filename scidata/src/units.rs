use std::fmt;

/// Unit-of-measure tag carried by a variable.
///
/// Only identity matters here: units are compared, never combined. The empty symbol means
/// dimensionless.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Unit {
    symbol: String,
}

impl Unit {
    pub fn new<S: Into<String>>(symbol: S) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn dimensionless() -> Self {
        Self::default()
    }

    pub fn counts() -> Self {
        Self::new("counts")
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_dimensionless(&self) -> bool {
        self.symbol.is_empty()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            write!(f, "dimensionless")
        } else {
            write!(f, "{}", self.symbol)
        }
    }
}
