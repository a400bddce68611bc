use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl Compression {
    /// Returns the short name stored alongside persisted data.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None, "none")]
    #[case(Compression::Gzip, "gzip")]
    #[case(Compression::Zstd, "zstd")]
    fn test_name_parses_back(#[case] format: Compression, #[case] expected: &str) {
        assert_eq!(format.as_str(), expected);
        assert_eq!(format.to_string().parse::<Compression>().unwrap(), format);
    }
}
