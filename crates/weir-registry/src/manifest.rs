//! Operation manifest produced by the kernel generator.
//!
//! ```json
//! {
//!   "version": 1,
//!   "operations": [
//!     {
//!       "op_id": 1,
//!       "name": "negate",
//!       "input_contracts": [{ "kind": "f32", "shape": [64] }],
//!       "output_contract": { "kind": "f32", "shape": [64] },
//!       "entry_symbol": "negate_f32"
//!     }
//!   ]
//! }
//! ```

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::contract::ShapeContract;

/// Manifest format version understood by this build.
pub const MANIFEST_VERSION: u32 = 1;

fn default_version() -> u32 {
    MANIFEST_VERSION
}

/// The parsed manifest: an ordered list of operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version. Defaults to [`MANIFEST_VERSION`] when absent.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Operations in declaration order.
    pub operations: Vec<ManifestEntry>,
}

/// One operation as declared by the generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Operation id used on the wire.
    pub op_id: u32,
    /// Human-readable name.
    pub name: String,
    /// Contracts for each input, in order.
    #[serde(alias = "inputs")]
    pub input_contracts: Vec<ShapeContract>,
    /// Contract for the output.
    #[serde(alias = "output")]
    pub output_contract: ShapeContract,
    /// Symbol resolved against the kernel library.
    pub entry_symbol: String,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(text).map_err(ManifestError::Parse)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(ManifestError::Parse)
    }
}

/// Errors from reading a manifest or building a registry from it.
#[derive(Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The text is not a valid manifest.
    Parse(serde_json::Error),
    /// The manifest declares a version this build does not understand.
    UnsupportedVersion {
        /// The version found.
        found: u32,
    },
    /// Two entries share an op id.
    DuplicateOpId {
        /// The repeated id.
        op_id: u32,
    },
    /// An entry declares more inputs than a command can carry.
    TooManyInputs {
        /// Offending entry.
        op_id: u32,
        /// Declared input count.
        count: usize,
    },
    /// A contract has more dimensions than a descriptor can carry.
    RankTooLarge {
        /// Offending entry.
        op_id: u32,
        /// Declared rank.
        rank: usize,
    },
    /// An entry symbol is missing from the kernel library (strict mode).
    UnresolvedSymbol {
        /// Offending entry.
        op_id: u32,
        /// The missing symbol.
        symbol: String,
    },
    /// The resolved kernel cannot serve the declared contracts.
    KernelMismatch {
        /// Offending entry.
        op_id: u32,
        /// The kernel's entry symbol.
        symbol: String,
    },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read manifest {}: {source}", path.display())
            }
            Self::Parse(e) => write!(f, "invalid manifest: {e}"),
            Self::UnsupportedVersion { found } => write!(
                f,
                "unsupported manifest version {found} (expected {MANIFEST_VERSION})"
            ),
            Self::DuplicateOpId { op_id } => write!(f, "duplicate op_id {op_id}"),
            Self::TooManyInputs { op_id, count } => write!(
                f,
                "op {op_id}: {count} inputs exceeds the maximum of {}",
                weir_core::MAX_INPUTS
            ),
            Self::RankTooLarge { op_id, rank } => write!(
                f,
                "op {op_id}: rank {rank} exceeds the maximum of {}",
                weir_core::MAX_RANK
            ),
            Self::UnresolvedSymbol { op_id, symbol } => {
                write!(f, "op {op_id}: entry symbol '{symbol}' not found")
            }
            Self::KernelMismatch { op_id, symbol } => write!(
                f,
                "op {op_id}: kernel '{symbol}' does not accept the declared element kinds"
            ),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DimSpec;
    use weir_core::ElementKind;

    const NEGATE: &str = r#"{
        "version": 1,
        "operations": [{
            "op_id": 1,
            "name": "negate",
            "input_contracts": [{"kind": "f32", "shape": [64]}],
            "output_contract": {"kind": "f32", "shape": [64]},
            "entry_symbol": "negate_f32"
        }]
    }"#;

    #[test]
    fn parses_operations_in_order() {
        let m = Manifest::from_json(NEGATE).unwrap();
        assert_eq!(m.operations.len(), 1);
        let op = &m.operations[0];
        assert_eq!(op.op_id, 1);
        assert_eq!(op.entry_symbol, "negate_f32");
        assert_eq!(op.output_contract.kind, ElementKind::F32);
        assert_eq!(op.input_contracts[0].shape, vec![DimSpec::Fixed(64)]);
    }

    #[test]
    fn version_defaults_when_absent() {
        let m = Manifest::from_json(r#"{"operations": []}"#).unwrap();
        assert_eq!(m.version, MANIFEST_VERSION);
    }

    #[test]
    fn future_version_is_rejected() {
        let err = Manifest::from_json(r#"{"version": 2, "operations": []}"#).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion { found: 2 }));
    }

    #[test]
    fn unknown_element_kind_is_a_parse_error() {
        let text = NEGATE.replace("\"f32\", \"shape\": [64]}]", "\"f16\", \"shape\": [64]}]");
        let err = Manifest::from_json(&text).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn serializes_back_to_equivalent_json() {
        let m = Manifest::from_json(NEGATE).unwrap();
        let again = Manifest::from_json(&m.to_json().unwrap()).unwrap();
        assert_eq!(again, m);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Manifest::from_path("/nonexistent/weir-manifest.json").unwrap_err();
        assert!(err.to_string().contains("weir-manifest.json"));
    }

    #[test]
    fn short_contract_keys_are_accepted() {
        let m = Manifest::from_json(
            r#"{"operations": [{
                "op_id": 9, "name": "copy", "entry_symbol": "copy",
                "inputs": [{"kind": "u8", "shape": ["n"]}],
                "output": {"kind": "u8", "shape": ["n"]}
            }]}"#,
        )
        .unwrap();
        assert_eq!(m.operations[0].input_contracts.len(), 1);
        assert_eq!(m.operations[0].output_contract.kind, ElementKind::U8);
    }
}
