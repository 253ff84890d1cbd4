use std::fmt;

/// How file system objects are serialized before hashing.
///
/// The alternate form (`{:#}`) prints the prefix used in front of hash
/// algorithms, `r:` for recursive and nothing for flat.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum FileIngestionMethod {
    #[default]
    Flat,
    Recursive,
}

impl FileIngestionMethod {
    pub fn prefix(&self) -> &'static str {
        match self {
            FileIngestionMethod::Flat => "",
            FileIngestionMethod::Recursive => "r:",
        }
    }

    /// Splits an optional `r:` prefix off `s`.
    pub fn parse_prefix(s: &str) -> (FileIngestionMethod, &str) {
        if let Some(rest) = s.strip_prefix("r:") {
            (FileIngestionMethod::Recursive, rest)
        } else {
            (FileIngestionMethod::Flat, s)
        }
    }
}

impl fmt::Display for FileIngestionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FileIngestionMethod::*;
        if f.alternate() {
            f.write_str(self.prefix())
        } else {
            match self {
                Recursive => f.write_str("recursive"),
                Flat => f.write_str("flat"),
            }
        }
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::FileIngestionMethod;

    impl Arbitrary for FileIngestionMethod {
        type Parameters = ();
        type Strategy = BoxedStrategy<FileIngestionMethod>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            prop_oneof![
                Just(FileIngestionMethod::Flat),
                Just(FileIngestionMethod::Recursive),
            ]
            .boxed()
        }
    }
}
