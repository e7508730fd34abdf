use alloy::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy::json_abi::{Function, JsonAbi, Param, StateMutability};
use serde_json::Value;

use crate::error::{Error, Result};

/// Parse an ABI JSON array (or an artifact object carrying an `abi` field)
pub fn parse_abi(abi_json: &Value) -> Result<JsonAbi> {
    let abi = abi_json.get("abi").unwrap_or(abi_json);
    if !abi.is_array() {
        return Err(Error::config("ABI must be a JSON array"));
    }

    serde_json::from_value(abi.clone()).map_err(|e| Error::config(format!("Invalid ABI: {}", e)))
}

/// Parse ABI from a string
#[cfg(test)]
pub fn parse_abi_string(abi_str: &str) -> Result<JsonAbi> {
    let abi_json: Value = serde_json::from_str(abi_str)
        .map_err(|e| Error::config(format!("Failed to parse ABI as JSON: {}", e)))?;
    parse_abi(&abi_json)
}

/// View and pure functions never change chain state
pub fn is_read_only(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::View | StateMutability::Pure
    )
}

/// Look up a function by name and argument count, so overloads are told apart
pub fn resolve_function<'a>(abi: &'a JsonAbi, name: &str, arity: usize) -> Result<&'a Function> {
    let overloads = abi
        .function(name)
        .ok_or_else(|| Error::config(format!("Function '{}' is not in the contract ABI", name)))?;

    overloads
        .iter()
        .find(|f| f.inputs.len() == arity)
        .ok_or_else(|| {
            let expected: Vec<String> = overloads.iter().map(|f| f.signature()).collect();
            Error::config(format!(
                "'{}' takes no overload with {} argument(s); available: {}",
                name,
                arity,
                expected.join(", ")
            ))
        })
}

/// Coerce textual arguments into typed values for the given parameters
pub fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        return Err(Error::config(format!(
            "Expected {} argument(s), got {}",
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| Error::config(format!("Unsupported type {}: {}", param.ty, e)))?;
            ty.coerce_str(arg.trim()).map_err(|e| {
                Error::config(format!(
                    "Invalid value '{}' for {} {}: {}",
                    arg, param.ty, param.name, e
                ))
            })
        })
        .collect()
}

/// Render a decoded value the way block explorers print it
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Function(f) => format!("0x{}", hex::encode(f.as_slice())),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("({})", inner.join(", "))
        }
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}

/// JSON form of a decoded value. Integers are strings to survive 256-bit widths.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(format_value(other)),
    }
}

/// JSON for a function's outputs: a single unnamed output is returned bare,
/// named outputs (public struct getters) become an object
pub fn outputs_to_json(outputs: &[Param], values: &[DynSolValue]) -> Value {
    let named = !outputs.is_empty() && outputs.iter().all(|p| !p.name.is_empty());

    if named && outputs.len() == values.len() {
        let map = outputs
            .iter()
            .zip(values)
            .map(|(param, value)| (param.name.clone(), value_to_json(value)))
            .collect();
        return Value::Object(map);
    }

    match values {
        [single] => value_to_json(single),
        _ => Value::Array(values.iter().map(value_to_json).collect()),
    }
}
