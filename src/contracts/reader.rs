use std::fmt;
use std::str::FromStr;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes};
use serde_json::Value;

use super::abi::{coerce_args, format_value, is_read_only, outputs_to_json, resolve_function};
use super::caller::ChainClient;
use crate::error::{Error, Result};

/// A read-only call, written as `name(arg, ...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub function: String,
    pub args: Vec<String>,
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (function, args) = match s.split_once('(') {
            Some((name, rest)) => {
                let inner = rest.strip_suffix(')').ok_or_else(|| {
                    Error::config(format!("Call '{}' is missing a closing parenthesis", s))
                })?;
                let args = if inner.trim().is_empty() {
                    Vec::new()
                } else {
                    split_args(inner).ok_or_else(|| {
                        Error::config(format!("Call '{}' has unbalanced brackets", s))
                    })?
                };
                (name.trim(), args)
            }
            None => (s, Vec::new()),
        };

        if function.is_empty() || !function.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(format!("'{}' is not a valid function call", s)));
        }

        Ok(Self {
            function: function.to_string(),
            args,
        })
    }
}

/// Split on commas outside brackets and quotes, so array and tuple
/// arguments like `[1,2]` or `(0xabc,3)` stay whole
fn split_args(inner: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '(' if !quoted => depth += 1,
            ']' | ')' if !quoted => depth = depth.checked_sub(1)?,
            ',' if !quoted && depth == 0 => {
                args.push(inner[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quoted {
        return None;
    }
    args.push(inner[start..].trim().to_string());
    Some(args)
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function, self.args.join(", "))
    }
}

/// Decoded answer to one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query: Query,
    pub function: Function,
    pub values: Vec<DynSolValue>,
}

impl QueryResult {
    /// Single line rendering; tuples of outputs are parenthesised
    pub fn display_value(&self) -> String {
        match self.values.as_slice() {
            [single] => format_value(single),
            many => format_value(&DynSolValue::Tuple(many.to_vec())),
        }
    }

    pub fn to_json(&self) -> Value {
        outputs_to_json(&self.function.outputs, &self.values)
    }
}

/// A query with its function resolved and arguments encoded
struct PreparedCall<'a> {
    query: &'a Query,
    function: &'a Function,
    calldata: Bytes,
}

/// Issues read-only calls against a deployed contract
pub struct StateReader<'a> {
    client: &'a dyn ChainClient,
    abi: &'a JsonAbi,
}

impl<'a> StateReader<'a> {
    pub fn new(client: &'a dyn ChainClient, abi: &'a JsonAbi) -> Self {
        Self { client, abi }
    }

    /// Run the queries in order against `address`.
    ///
    /// Every query is validated against the ABI before the first RPC. Each
    /// result is passed to `on_result` as soon as it is decoded, and all of
    /// them are returned in the order the queries were given.
    pub async fn read<F>(
        &self,
        address: Address,
        queries: &[Query],
        mut on_result: F,
    ) -> Result<Vec<QueryResult>>
    where
        F: FnMut(&QueryResult),
    {
        let prepared = queries
            .iter()
            .map(|q| self.prepare(q))
            .collect::<Result<Vec<_>>>()?;

        let code = self
            .client
            .code_at(address)
            .await
            .map_err(|e| Error::query(e.to_string()))?;
        if code.is_empty() {
            return Err(Error::query(format!("No contract deployed at {}", address)));
        }

        let mut results = Vec::with_capacity(prepared.len());
        for call in prepared {
            tracing::debug!("Calling {} with 0x{}", call.query, hex::encode(&call.calldata));

            let output = self
                .client
                .call(address, call.calldata)
                .await
                .map_err(|e| Error::query(format!("{}: {}", call.query, e)))?;

            let values = decode_output(call.function, &output)
                .map_err(|e| Error::query(format!("{} at {}: {}", call.query, address, e)))?;

            let result = QueryResult {
                query: call.query.clone(),
                function: call.function.clone(),
                values,
            };
            on_result(&result);
            results.push(result);
        }

        Ok(results)
    }

    fn prepare<'q>(&'q self, query: &'q Query) -> Result<PreparedCall<'q>> {
        let function = resolve_function(self.abi, &query.function, query.args.len())?;

        if !is_read_only(function) {
            return Err(Error::config(format!(
                "{} is not a view function; refusing to call it",
                function.signature()
            )));
        }

        let values = coerce_args(&function.inputs, &query.args)
            .map_err(|e| Error::config(format!("{}: {}", query, e)))?;
        let calldata = function
            .abi_encode_input(&values)
            .map_err(|e| Error::config(format!("Failed to encode {}: {}", query, e)))?;

        Ok(PreparedCall {
            query,
            function,
            calldata: Bytes::from(calldata),
        })
    }
}

/// Empty return data means the callee doesn't implement the function, so it
/// must not be decoded into zero values
fn decode_output(function: &Function, output: &Bytes) -> std::result::Result<Vec<DynSolValue>, String> {
    if output.is_empty() && !function.outputs.is_empty() {
        return Err("empty response; the contract does not match the ABI".to_string());
    }

    function
        .abi_decode_output(output)
        .map_err(|e| format!("response does not match the ABI: {}", e))
}
