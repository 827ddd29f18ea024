//! Model checkpoint serialization.
//!
//! Checkpoints are a flat name→tensor mapping written in the
//! `SafeTensors` container layout:
//!
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: tensor names, dtypes, shapes, data_offsets]
//! [Raw tensor data: F32 values in little-endian]
//! ```
//!
//! Parameters are named by their index in the module's stable parameter
//! order, so save→load round-trips between models of identical
//! architecture reproduce bit-identical predictions.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TasarError};
use crate::nn::Module;

/// State dictionary: parameter name → (data, shape).
pub type StateDict = BTreeMap<String, (Vec<f32>, Vec<usize>)>;

/// Metadata for a single tensor in the `SafeTensors` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TensorMetadata {
    /// Data type, always "F32" here
    dtype: String,
    /// Tensor shape
    shape: Vec<usize>,
    /// Byte offsets `[start, end]` into the raw data section
    data_offsets: [usize; 2],
}

/// Extract the state dictionary from a module.
///
/// Parameters are keyed by their zero-padded index in the module's
/// parameter order; `BTreeMap` iteration then matches parameter order.
#[must_use]
pub fn state_dict<M: Module + ?Sized>(module: &M) -> StateDict {
    let mut state = StateDict::new();
    for (i, param) in module.parameters().iter().enumerate() {
        state.insert(
            format!("param.{i:04}"),
            (param.data().to_vec(), param.shape().to_vec()),
        );
    }
    state
}

/// Load a state dictionary into a module, in place.
///
/// Parameter data is copied into the existing tensors, so optimizer
/// state keyed by tensor identity stays valid.
///
/// # Errors
///
/// Fails on missing parameters or shape mismatches; the module is
/// partially updated only up to the failing parameter.
pub fn load_state_dict_into<M: Module + ?Sized>(module: &mut M, state: &StateDict) -> Result<()> {
    let params = module.parameters_mut();

    for (i, param) in params.into_iter().enumerate() {
        let name = format!("param.{i:04}");
        let (data, shape) = state.get(&name).ok_or_else(|| {
            TasarError::Serialization(format!("missing parameter '{name}' in state dict"))
        })?;

        if param.shape() != shape.as_slice() {
            return Err(TasarError::DimensionMismatch {
                expected: format!("{:?}", param.shape()),
                actual: format!("{shape:?}"),
            });
        }

        param.data_mut().copy_from_slice(data);
    }

    Ok(())
}

/// Save a state dictionary to a `SafeTensors`-layout file.
///
/// # Errors
///
/// Fails on JSON serialization or file write errors.
pub fn save_safetensors<P: AsRef<Path>>(path: P, tensors: &StateDict) -> Result<()> {
    let mut metadata: BTreeMap<String, TensorMetadata> = BTreeMap::new();
    let mut raw_data = Vec::new();
    let mut offset = 0usize;

    for (name, (data, shape)) in tensors {
        let start = offset;
        let end = start + data.len() * 4;
        metadata.insert(
            name.clone(),
            TensorMetadata {
                dtype: "F32".to_string(),
                shape: shape.clone(),
                data_offsets: [start, end],
            },
        );
        for &value in data {
            raw_data.extend_from_slice(&value.to_le_bytes());
        }
        offset = end;
    }

    let metadata_json = serde_json::to_string(&metadata)
        .map_err(|e| TasarError::Serialization(format!("JSON serialization failed: {e}")))?;
    let metadata_bytes = metadata_json.as_bytes();

    let mut output = Vec::with_capacity(8 + metadata_bytes.len() + raw_data.len());
    output.extend_from_slice(&(metadata_bytes.len() as u64).to_le_bytes());
    output.extend_from_slice(metadata_bytes);
    output.extend_from_slice(&raw_data);

    fs::write(path, output)?;
    Ok(())
}

/// Load a state dictionary from a `SafeTensors`-layout file.
///
/// # Errors
///
/// Fails on I/O errors, malformed headers, unsupported dtypes, or
/// out-of-range data offsets.
pub fn load_safetensors<P: AsRef<Path>>(path: P) -> Result<StateDict> {
    let bytes = fs::read(path)?;
    if bytes.len() < 8 {
        return Err(TasarError::Serialization(
            "file too short for SafeTensors header".to_string(),
        ));
    }

    let header_len = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes")) as usize;
    let header_end = 8 + header_len;
    if bytes.len() < header_end {
        return Err(TasarError::Serialization(
            "metadata length exceeds file size".to_string(),
        ));
    }

    let metadata: BTreeMap<String, TensorMetadata> =
        serde_json::from_slice(&bytes[8..header_end])
            .map_err(|e| TasarError::Serialization(format!("invalid JSON metadata: {e}")))?;

    let raw = &bytes[header_end..];
    let mut state = StateDict::new();

    for (name, meta) in metadata {
        if meta.dtype != "F32" {
            return Err(TasarError::Serialization(format!(
                "unsupported dtype '{}' for tensor '{name}'",
                meta.dtype
            )));
        }
        let [start, end] = meta.data_offsets;
        if end > raw.len() || start > end || (end - start) % 4 != 0 {
            return Err(TasarError::Serialization(format!(
                "invalid data offsets for tensor '{name}'"
            )));
        }

        let expected: usize = meta.shape.iter().product();
        let count = (end - start) / 4;
        if count != expected {
            return Err(TasarError::Serialization(format!(
                "tensor '{name}' has {count} values but shape {:?}",
                meta.shape
            )));
        }

        let data: Vec<f32> = raw[start..end]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();
        state.insert(name, (data, meta.shape));
    }

    Ok(state)
}

/// Save a module's parameters to a file.
///
/// # Errors
///
/// Propagates serialization and I/O failures.
pub fn save_model<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> Result<()> {
    save_safetensors(path, &state_dict(module))
}

/// Load parameters from a file into a module of identical architecture.
///
/// # Errors
///
/// Propagates I/O, format and shape-mismatch failures.
pub fn load_model<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> Result<()> {
    let state = load_safetensors(path)?;
    load_state_dict_into(module, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Linear, Module};

    #[test]
    fn test_state_dict_names_and_shapes() {
        let layer = Linear::with_seed(3, 2, Some(42));
        let state = state_dict(&layer);
        assert_eq!(state.len(), 2);
        assert_eq!(state["param.0000"].1, vec![3, 2]);
        assert_eq!(state["param.0001"].1, vec![2]);
    }

    #[test]
    fn test_load_state_dict_into_copies_values() {
        let src = Linear::with_seed(4, 3, Some(1));
        let state = state_dict(&src);

        let mut dst = Linear::with_seed(4, 3, Some(2));
        assert_ne!(src.parameters()[0].data(), dst.parameters()[0].data());

        load_state_dict_into(&mut dst, &state).expect("load");
        assert_eq!(src.parameters()[0].data(), dst.parameters()[0].data());
        assert_eq!(src.parameters()[1].data(), dst.parameters()[1].data());
    }

    #[test]
    fn test_load_state_dict_shape_mismatch() {
        let src = Linear::with_seed(4, 3, Some(1));
        let state = state_dict(&src);

        let mut dst = Linear::with_seed(5, 3, Some(2));
        let err = load_state_dict_into(&mut dst, &state).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn test_save_load_roundtrip_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("linear.safetensors");

        let src = Linear::with_seed(6, 4, Some(11));
        save_model(&src, &path).expect("save");

        let mut dst = Linear::with_seed(6, 4, Some(99));
        load_model(&mut dst, &path).expect("load");

        for (a, b) in src.parameters().iter().zip(dst.parameters().iter()) {
            assert_eq!(a.data(), b.data());
            assert_eq!(a.shape(), b.shape());
        }
    }

    #[test]
    fn test_load_rejects_truncated_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.safetensors");
        fs::write(&path, [1, 2, 3]).expect("write");
        assert!(load_safetensors(&path).is_err());
    }

    #[test]
    fn test_load_rejects_bad_offsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad_offsets.safetensors");

        let header = r#"{"param.0000":{"dtype":"F32","shape":[4],"data_offsets":[0,999]}}"#;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        fs::write(&path, bytes).expect("write");

        assert!(load_safetensors(&path).is_err());
    }

    #[test]
    fn test_missing_parameter_reported() {
        let mut layer = Linear::with_seed(2, 2, Some(3));
        let empty = StateDict::new();
        let err = load_state_dict_into(&mut layer, &empty).unwrap_err();
        assert!(err.to_string().contains("missing parameter"));
    }
}
