pub mod fastwig;
pub mod wigxjpf;

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::family::SymbolFamily;
use crate::key::CompositeKey;

/// External table set a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableFamily {
    /// `*.3j`, `*.6j`, `*.9j`: flat binary records, memory-mapped.
    Fastwig,
    /// `*.npz`: key/value arrays, parsed into owned memory.
    Wigxjpf,
}

impl TableFamily {
    pub const ALL: [TableFamily; 2] = [Self::Fastwig, Self::Wigxjpf];

    pub fn recognize(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "3j" | "6j" | "9j" => Some(Self::Fastwig),
            "npz" => Some(Self::Wigxjpf),
            _ => None,
        }
    }
}

impl fmt::Display for TableFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fastwig => write!(f, "fastwigxj"),
            Self::Wigxjpf => write!(f, "wigxjpf"),
        }
    }
}

/// Symbol family implied by a fastwig file extension.
pub(crate) fn extension_symbol(path: &Path) -> Option<SymbolFamily> {
    let ext = path.extension()?.to_str()?;
    let tag = ext.strip_suffix(['j', 'J'])?.parse::<u8>().ok()?;
    SymbolFamily::from_tag(tag)
}

/// Write `entries` in the format selected by the file extension.
pub fn write_table(
    path: &Path,
    symbol: SymbolFamily,
    entries: &[(CompositeKey, f64)],
) -> Result<TableFamily> {
    match TableFamily::recognize(path) {
        Some(TableFamily::Fastwig) => {
            fastwig::write(path, symbol, entries)?;
            Ok(TableFamily::Fastwig)
        }
        Some(TableFamily::Wigxjpf) => {
            wigxjpf::write(path, symbol, entries)?;
            Ok(TableFamily::Wigxjpf)
        }
        None => Err(crate::error::Error::format(
            path,
            "unrecognized extension (expected .3j, .6j, .9j or .npz)",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_extensions() {
        assert_eq!(
            TableFamily::recognize(Path::new("t/table_9j.9j")),
            Some(TableFamily::Fastwig)
        );
        assert_eq!(
            TableFamily::recognize(Path::new("t/wig.NPZ")),
            Some(TableFamily::Wigxjpf)
        );
        assert_eq!(TableFamily::recognize(Path::new("t/readme.txt")), None);
        assert_eq!(TableFamily::recognize(Path::new("t/noext")), None);
        assert_eq!(
            extension_symbol(Path::new("a.6j")),
            Some(SymbolFamily::SixJ)
        );
        assert_eq!(extension_symbol(Path::new("a.npz")), None);
    }
}
