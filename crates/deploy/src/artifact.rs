//! Compilation artifacts and constructor encoding.
//!
//! Both Hardhat (`artifacts/contracts/<Name>.sol/<Name>.json`, `bytecode` as a
//! hex string) and Foundry (`out/<Name>.sol/<Name>.json`, `bytecode.object`)
//! layouts are understood.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::Deserialize;

use crate::{
    DeployError,
    plan::{ArgValue, ContractName},
};

/// Marker of an unlinked library reference inside creation bytecode.
const LIBRARY_PLACEHOLDER: &str = "__$";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn into_hex(self) -> String {
        match self {
            RawBytecode::Hex(hex) | RawBytecode::Object { object: hex } => hex,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// ABI and creation bytecode of a compiled contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: ContractName,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(name: ContractName, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name,
            abi,
            bytecode,
        }
    }

    /// Parse an artifact from its JSON representation.
    pub fn from_json(name: ContractName, json: &str) -> Result<Self, DeployError> {
        let invalid = |reason: String| DeployError::Artifact {
            contract: name,
            reason,
        };

        let raw: RawArtifact =
            serde_json::from_str(json).map_err(|e| invalid(format!("malformed JSON: {e}")))?;

        let hex_code = raw.bytecode.into_hex();
        if hex_code.contains(LIBRARY_PLACEHOLDER) {
            return Err(invalid("bytecode references unlinked libraries".to_string()));
        }

        let bytecode = hex::decode(hex_code.trim_start_matches("0x"))
            .map_err(|e| invalid(format!("bytecode is not valid hex: {e}")))?;
        if bytecode.is_empty() {
            return Err(invalid(
                "bytecode is empty (abstract contract or interface?)".to_string(),
            ));
        }

        Ok(Self::new(name, raw.abi, bytecode.into()))
    }

    /// Read the artifact of `name` below `dir`.
    pub fn load(dir: &Path, name: ContractName) -> Result<Self, DeployError> {
        let path = candidate_paths(dir, name)
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| DeployError::Artifact {
                contract: name,
                reason: format!("no artifact found under {}", dir.display()),
            })?;

        let json = std::fs::read_to_string(&path).map_err(|e| DeployError::Artifact {
            contract: name,
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        tracing::debug!(contract = %name, path = %path.display(), "Artifact loaded");
        Self::from_json(name, &json)
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// The arguments are checked against the constructor declared in the ABI:
    /// arity, kinds, and integer widths must agree.
    pub fn init_code(&self, args: &[ArgValue]) -> Result<Bytes, DeployError> {
        let mismatch = |reason: String| DeployError::Deployment {
            contract: self.name,
            reason: format!("constructor arguments do not match the ABI: {reason}"),
        };

        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(mismatch(format!(
                "expected {} arguments, got {}",
                inputs.len(),
                args.len()
            )));
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty: DynSolType = param
                    .resolve()
                    .map_err(|e| mismatch(format!("parameter `{}`: {e}", param.name)))?;
                coerce(arg, &ty).map_err(|e| mismatch(format!("parameter `{}`: {e}", param.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut code = self.bytecode.to_vec();
        if !values.is_empty() {
            code.extend_from_slice(&DynSolValue::Tuple(values).abi_encode_params());
        }
        Ok(code.into())
    }
}

/// Convert a resolved argument into the ABI value of the declared type.
fn coerce(value: &ArgValue, ty: &DynSolType) -> Result<DynSolValue, String> {
    match (value, ty) {
        (ArgValue::Address(address), DynSolType::Address) => Ok(DynSolValue::Address(*address)),
        (ArgValue::Uint(v), DynSolType::Uint(bits)) if v.bit_len() <= *bits => {
            Ok(DynSolValue::Uint(*v, *bits))
        }
        (ArgValue::Uint(v), DynSolType::Uint(bits)) => Err(format!("{v} overflows uint{bits}")),
        (ArgValue::String(s), DynSolType::String) => Ok(DynSolValue::String(s.clone())),
        (value, ty) => Err(format!("cannot pass {value} as {}", ty.sol_type_name())),
    }
}

fn candidate_paths(dir: &Path, name: ContractName) -> Vec<PathBuf> {
    let source = format!("{name}.sol");
    let file = format!("{name}.json");
    vec![
        dir.join("contracts").join(&source).join(&file),
        dir.join(&source).join(&file),
        dir.join(&file),
    ]
}

/// The artifacts of every contract of a plan, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: BTreeMap<ContractName, Artifact>,
}

impl ArtifactStore {
    /// Load the artifacts of `names` from `dir`. Fails on the first missing
    /// or malformed artifact.
    pub fn load(
        dir: &Path,
        names: impl IntoIterator<Item = ContractName>,
    ) -> Result<Self, DeployError> {
        names
            .into_iter()
            .map(|name| Artifact::load(dir, name))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::from_artifacts)
    }

    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        Self {
            artifacts: artifacts.into_iter().map(|a| (a.name, a)).collect(),
        }
    }

    pub fn get(&self, name: ContractName) -> Result<&Artifact, DeployError> {
        self.artifacts.get(&name).ok_or_else(|| DeployError::Artifact {
            contract: name,
            reason: "artifact not loaded".to_string(),
        })
    }
}
