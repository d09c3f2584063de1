//! The immutable op-id → kernel table and its validation gate.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, instrument, warn};
use weir_core::{CommandRecord, OpId, MAX_INPUTS, MAX_RANK};

use crate::contract::{ShapeContract, SlotRole, ValidationError};
use crate::kernel::Kernel;
use crate::library::KernelLibrary;
use crate::manifest::{Manifest, ManifestError};

/// What to do with a manifest entry whose symbol is not in the library,
/// or whose kernel does not accept its declared element kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Fail the whole load.
    #[default]
    Strict,
    /// Skip the entry and log a warning. Commands for it fail with
    /// `UnknownOperation`.
    Lenient,
}

/// A resolved operation.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Wire id.
    pub op_id: OpId,
    /// Human-readable name.
    pub name: String,
    /// Per-input contracts.
    pub input_contracts: Vec<ShapeContract>,
    /// Output contract.
    pub output_contract: ShapeContract,
    /// Symbol the kernel was resolved from.
    pub entry_symbol: String,
    kernel: Arc<dyn Kernel>,
}

impl RegistryEntry {
    /// The routine.
    pub fn kernel(&self) -> &dyn Kernel {
        &*self.kernel
    }

    /// Check every slot of `command` against this entry's contracts.
    ///
    /// Symbols are bound across all slots of the one command, inputs
    /// first, then the output.
    pub fn validate(&self, command: &CommandRecord) -> Result<(), ValidationError> {
        if command.inputs.len() != self.input_contracts.len() {
            return Err(ValidationError::InputCount {
                expected: self.input_contracts.len(),
                actual: command.inputs.len(),
            });
        }
        let mut bindings = IndexMap::new();
        for (i, (contract, slot)) in self
            .input_contracts
            .iter()
            .zip(command.inputs.iter())
            .enumerate()
        {
            contract.check(SlotRole::Input(i), slot, &mut bindings)?;
        }
        self.output_contract
            .check(SlotRole::Output, &command.output, &mut bindings)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("op_id", &self.op_id)
            .field("name", &self.name)
            .field("input_contracts", &self.input_contracts)
            .field("output_contract", &self.output_contract)
            .field("entry_symbol", &self.entry_symbol)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from op id to [`RegistryEntry`].
///
/// Built once per session, from a manifest via [`load`](Self::load) or
/// programmatically via [`builder`](Self::builder), then shared behind an
/// `Arc`.
#[derive(Clone, Debug, Default)]
pub struct OperationRegistry {
    entries: IndexMap<OpId, RegistryEntry>,
    skipped: Vec<OpId>,
}

impl OperationRegistry {
    /// Resolve every manifest entry against `library`.
    #[instrument(
        name = "registry::load",
        level = "debug",
        skip_all,
        fields(operations = manifest.operations.len())
    )]
    pub fn load(
        manifest: &Manifest,
        library: &KernelLibrary,
        mode: LoadMode,
    ) -> Result<Self, ManifestError> {
        let mut registry = Self::default();
        for entry in &manifest.operations {
            let Some(kernel) = library.resolve(&entry.entry_symbol) else {
                match mode {
                    LoadMode::Strict => {
                        return Err(ManifestError::UnresolvedSymbol {
                            op_id: entry.op_id,
                            symbol: entry.entry_symbol.clone(),
                        });
                    }
                    LoadMode::Lenient => {
                        warn!(
                            op_id = entry.op_id,
                            symbol = %entry.entry_symbol,
                            "entry symbol not found, skipping operation"
                        );
                        registry.skipped.push(OpId(entry.op_id));
                        continue;
                    }
                }
            };
            let inserted = registry.insert(RegistryEntry {
                op_id: OpId(entry.op_id),
                name: entry.name.clone(),
                input_contracts: entry.input_contracts.clone(),
                output_contract: entry.output_contract.clone(),
                entry_symbol: entry.entry_symbol.clone(),
                kernel,
            });
            match inserted {
                Err(e @ ManifestError::KernelMismatch { .. })
                    if matches!(mode, LoadMode::Lenient) =>
                {
                    warn!(op_id = entry.op_id, error = %e, "skipping operation");
                    registry.skipped.push(OpId(entry.op_id));
                }
                other => other?,
            }
        }
        info!(
            operations = registry.len(),
            skipped = registry.skipped.len(),
            "operation registry loaded"
        );
        Ok(registry)
    }

    /// Start a programmatic registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            registry: Self::default(),
        }
    }

    fn insert(&mut self, entry: RegistryEntry) -> Result<(), ManifestError> {
        let op_id = entry.op_id.0;
        if entry.input_contracts.len() > MAX_INPUTS {
            return Err(ManifestError::TooManyInputs {
                op_id,
                count: entry.input_contracts.len(),
            });
        }
        let widest = entry
            .input_contracts
            .iter()
            .chain(std::iter::once(&entry.output_contract))
            .map(|c| c.shape.len())
            .max()
            .unwrap_or(0);
        if widest > MAX_RANK {
            return Err(ManifestError::RankTooLarge {
                op_id,
                rank: widest,
            });
        }
        if !entry
            .kernel
            .accepts(&entry.input_contracts, &entry.output_contract)
        {
            return Err(ManifestError::KernelMismatch {
                op_id,
                symbol: entry.entry_symbol,
            });
        }
        if self.entries.contains_key(&entry.op_id) {
            return Err(ManifestError::DuplicateOpId { op_id });
        }
        self.entries.insert(entry.op_id, entry);
        Ok(())
    }

    /// Entry for `op_id`, if registered.
    pub fn lookup(&self, op_id: OpId) -> Option<&RegistryEntry> {
        self.entries.get(&op_id)
    }

    /// Entry for `op_id`, or [`ValidationError::UnknownOperation`].
    pub fn resolve(&self, op_id: OpId) -> Result<&RegistryEntry, ValidationError> {
        self.lookup(op_id)
            .ok_or(ValidationError::UnknownOperation { op_id })
    }

    /// Look up the command's operation and check it against the contract.
    pub fn validate(&self, command: &CommandRecord) -> Result<&RegistryEntry, ValidationError> {
        let entry = self.resolve(command.op_id)?;
        entry.validate(command)?;
        Ok(entry)
    }

    /// Entries in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Op ids skipped by a lenient load.
    pub fn skipped(&self) -> &[OpId] {
        &self.skipped
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no operations are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Programmatic construction of an [`OperationRegistry`].
pub struct RegistryBuilder {
    registry: OperationRegistry,
}

impl RegistryBuilder {
    /// Register `kernel` as `op_id`. The entry symbol is the kernel's name.
    pub fn operation(
        mut self,
        op_id: u32,
        name: impl Into<String>,
        input_contracts: Vec<ShapeContract>,
        output_contract: ShapeContract,
        kernel: Arc<dyn Kernel>,
    ) -> Result<Self, ManifestError> {
        self.registry.insert(RegistryEntry {
            op_id: OpId(op_id),
            name: name.into(),
            input_contracts,
            output_contract,
            entry_symbol: kernel.name().to_string(),
            kernel,
        })?;
        Ok(self)
    }

    /// Finish.
    pub fn build(self) -> OperationRegistry {
        self.registry
    }
}

// Compile-time assertion: the registry is shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<OperationRegistry>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DimSpec;
    use crate::kernels::Negate;
    use smallvec::smallvec;
    use weir_core::{CorrelationId, ElementKind, ErrorCode, Sequence, SlotDescriptor};

    const MANIFEST: &str = r#"{
        "operations": [
            {
                "op_id": 1, "name": "negate", "entry_symbol": "negate_f32",
                "input_contracts": [{"kind": "f32", "shape": [64]}],
                "output_contract": {"kind": "f32", "shape": [64]}
            },
            {
                "op_id": 2, "name": "add", "entry_symbol": "add_f32",
                "input_contracts": [{"kind": "f32", "shape": ["n"]}, {"kind": "f32", "shape": ["n"]}],
                "output_contract": {"kind": "f32", "shape": ["n"]}
            }
        ]
    }"#;

    fn registry() -> OperationRegistry {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Strict).unwrap()
    }

    fn f32s(offset: u64, n: u32) -> SlotDescriptor {
        SlotDescriptor::tensor(offset, ElementKind::F32, &[n]).unwrap()
    }

    fn command(op_id: u32, inputs: Vec<SlotDescriptor>, output: SlotDescriptor) -> CommandRecord {
        CommandRecord {
            sequence: Sequence(0),
            op_id: OpId(op_id),
            correlation_id: CorrelationId(1),
            inputs: inputs.into_iter().collect(),
            output,
        }
    }

    #[test]
    fn load_resolves_symbols_in_order() {
        let r = registry();
        assert_eq!(r.len(), 2);
        let ids: Vec<_> = r.iter().map(|e| e.op_id).collect();
        assert_eq!(ids, vec![OpId(1), OpId(2)]);
        assert_eq!(r.lookup(OpId(1)).unwrap().kernel().name(), "negate_f32");
    }

    #[test]
    fn unknown_op_id_is_unknown_operation() {
        let r = registry();
        assert!(r.lookup(OpId(999)).is_none());
        let err = r
            .validate(&command(999, vec![f32s(0, 64)], f32s(256, 64)))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownOperation);
    }

    #[test]
    fn matching_command_validates() {
        let r = registry();
        let entry = r
            .validate(&command(1, vec![f32s(0, 64)], f32s(256, 64)))
            .unwrap();
        assert_eq!(entry.name, "negate");
    }

    #[test]
    fn wrong_input_count_is_shape_mismatch() {
        let r = registry();
        let err = r
            .validate(&command(1, vec![f32s(0, 64), f32s(0, 64)], f32s(256, 64)))
            .unwrap_err();
        assert_eq!(err, ValidationError::InputCount { expected: 1, actual: 2 });
        assert_eq!(err.code(), ErrorCode::ShapeMismatch);
    }

    #[test]
    fn symbolic_dims_must_agree_across_inputs_and_output() {
        let r = registry();
        r.validate(&command(2, vec![f32s(0, 10), f32s(40, 10)], f32s(80, 10)))
            .unwrap();
        let err = r
            .validate(&command(2, vec![f32s(0, 10), f32s(40, 10)], f32s(80, 9)))
            .unwrap_err();
        assert!(matches!(err, ValidationError::SymbolMismatch { slot: SlotRole::Output, .. }));
    }

    #[test]
    fn strict_load_rejects_missing_symbol() {
        let text = MANIFEST.replace("add_f32", "add_f16");
        let manifest = Manifest::from_json(&text).unwrap();
        let err = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Strict)
            .unwrap_err();
        assert!(matches!(err, ManifestError::UnresolvedSymbol { op_id: 2, .. }));
    }

    #[test]
    fn lenient_load_skips_missing_symbol() {
        let text = MANIFEST.replace("add_f32", "add_f16");
        let manifest = Manifest::from_json(&text).unwrap();
        let r = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Lenient)
            .unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.skipped(), &[OpId(2)]);
        assert!(r.lookup(OpId(2)).is_none());
    }

    #[test]
    fn strict_load_rejects_kernel_of_the_wrong_kind() {
        let text = MANIFEST.replace(
            r#""kind": "f32", "shape": [64]"#,
            r#""kind": "f64", "shape": [64]"#,
        );
        let manifest = Manifest::from_json(&text).unwrap();
        assert_eq!(manifest.operations[0].output_contract.kind, ElementKind::F64);
        let err = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::KernelMismatch { op_id: 1, ref symbol } if symbol == "negate_f32"
        ));
    }

    #[test]
    fn lenient_load_skips_kernel_of_the_wrong_kind() {
        let text = MANIFEST.replace(
            r#""kind": "f32", "shape": [64]"#,
            r#""kind": "f64", "shape": [64]"#,
        );
        let manifest = Manifest::from_json(&text).unwrap();
        let r = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Lenient)
            .unwrap();
        assert_eq!(r.skipped(), &[OpId(1)]);
        assert_eq!(r.lookup(OpId(2)).unwrap().entry_symbol, "add_f32");
    }

    #[test]
    fn builder_rejects_kernel_of_the_wrong_kind() {
        let err = OperationRegistry::builder()
            .operation(
                3,
                "dot",
                vec![ShapeContract::fixed(ElementKind::U8, &[4]); 2],
                ShapeContract::fixed(ElementKind::U8, &[1]),
                KernelLibrary::builtin().resolve("dot_u8_i32").unwrap(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, ManifestError::KernelMismatch { op_id: 3, .. }));
    }

    #[test]
    fn duplicate_op_id_is_rejected() {
        let text = MANIFEST.replace("\"op_id\": 2", "\"op_id\": 1");
        let manifest = Manifest::from_json(&text).unwrap();
        let err = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Strict)
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateOpId { op_id: 1 }));
    }

    #[test]
    fn builder_checks_limits() {
        let negate: Arc<dyn Kernel> = Arc::new(Negate::for_kind(ElementKind::F32).unwrap());
        let contract = ShapeContract::fixed(ElementKind::F32, &[1, 1, 1, 1, 1]);
        let err = OperationRegistry::builder()
            .operation(7, "deep", vec![], contract, Arc::clone(&negate))
            .err()
            .unwrap();
        assert!(matches!(err, ManifestError::RankTooLarge { op_id: 7, rank: 5 }));

        let wide = vec![ShapeContract::new(ElementKind::F32, [DimSpec::Symbol("n".into())]); 5];
        let err = OperationRegistry::builder()
            .operation(8, "wide", wide, ShapeContract::fixed(ElementKind::F32, &[1]), negate)
            .err()
            .unwrap();
        assert!(matches!(err, ManifestError::TooManyInputs { op_id: 8, count: 5 }));
    }

    #[test]
    fn builder_registers_kernels() {
        let r = OperationRegistry::builder()
            .operation(
                1,
                "negate",
                vec![ShapeContract::fixed(ElementKind::F32, &[4])],
                ShapeContract::fixed(ElementKind::F32, &[4]),
                Arc::new(Negate::for_kind(ElementKind::F32).unwrap()),
            )
            .unwrap()
            .build();
        let cmd = CommandRecord {
            sequence: Sequence(0),
            op_id: OpId(1),
            correlation_id: CorrelationId(0),
            inputs: smallvec![f32s(0, 4)],
            output: f32s(16, 4),
        };
        assert_eq!(r.validate(&cmd).unwrap().entry_symbol, "negate_f32");
    }
}
