//! `weir inspect`: validate a manifest and print the registry.

use std::path::Path;

use anyhow::{Context, Result};
use weir_registry::{KernelLibrary, LoadMode, Manifest, OperationRegistry};

pub fn inspect(manifest_path: &Path, lenient: bool, json: bool) -> Result<()> {
    let manifest = Manifest::from_path(manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;
    let mode = if lenient {
        LoadMode::Lenient
    } else {
        LoadMode::Strict
    };
    let registry = OperationRegistry::load(&manifest, &KernelLibrary::builtin(), mode)
        .context("building registry")?;

    if json {
        println!("{}", manifest.to_json()?);
    } else {
        print!("{}", render(&registry));
    }
    Ok(())
}

fn render(registry: &OperationRegistry) -> String {
    let mut out = format!("{:>6}  {:<20} {:<24} SIGNATURE\n", "OP", "NAME", "SYMBOL");
    for entry in registry.iter() {
        let inputs: Vec<String> = entry
            .input_contracts
            .iter()
            .map(ToString::to_string)
            .collect();
        out.push_str(&format!(
            "{:>6}  {:<20} {:<24} ({}) -> {}\n",
            entry.op_id.0,
            entry.name,
            entry.entry_symbol,
            inputs.join(", "),
            entry.output_contract
        ));
    }
    for op_id in registry.skipped() {
        out.push_str(&format!("{:>6}  (skipped: unresolved symbol)\n", op_id.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_line_per_operation() {
        let manifest = Manifest::from_json(
            r#"{"operations": [{
                "op_id": 2, "name": "add", "entry_symbol": "add_f32",
                "input_contracts": [{"kind": "f32", "shape": ["n"]}, {"kind": "f32", "shape": ["n"]}],
                "output_contract": {"kind": "f32", "shape": ["n"]}
            }]}"#,
        )
        .unwrap();
        let registry =
            OperationRegistry::load(&manifest, &KernelLibrary::builtin(), LoadMode::Strict)
                .unwrap();
        let text = render(&registry);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("(f32[n], f32[n]) -> f32[n]"));
        assert!(text.contains("add_f32"));
    }
}
