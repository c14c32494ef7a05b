//! In-process engine for exercising host code without the TFLite library.
//!
//! Models are JSON documents describing the input and output tensors and a
//! trivial operation:
//!
//! ```json
//! {
//!   "inputs":  [{"name": "x", "type": 1, "shape": [1, 4]}],
//!   "outputs": [{"name": "y", "type": 1, "shape": [1, 4]}],
//!   "op": "identity"
//! }
//! ```
//!
//! `type` is the raw `TfLiteType` code. Every handle the engine hands out is
//! counted while alive, and every lifecycle step is written to a journal, so
//! tests can check release order and leaks.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::{DelegateOptions, Engine, EngineInterpreter, ErrorLog, TensorMeta};
use crate::error::{Result, TfliteError};
use crate::status::Status;
use crate::tensor::ElementType;

/// Operation executed by a mock model on invoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockOp {
    /// Output `i` receives the bytes of input `i`.
    #[default]
    Identity,
    /// Outputs are zero-filled.
    Zeros,
}

/// One tensor of a mock model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockTensor {
    /// `None` models a tensor the engine reports without a name.
    #[serde(default)]
    pub name: Option<String>,
    /// Raw `TfLiteType` code.
    #[serde(rename = "type")]
    pub type_code: i32,
    pub shape: Vec<i32>,
    /// Overrides the byte size derived from shape and type.
    #[serde(default)]
    pub byte_size: Option<usize>,
}

impl MockTensor {
    /// Named tensor whose byte size follows from `shape` and `element_type`.
    pub fn new(name: &str, element_type: ElementType, shape: &[i32]) -> Self {
        Self {
            name: Some(name.to_string()),
            type_code: element_type.code(),
            shape: shape.to_vec(),
            byte_size: None,
        }
    }

    /// Tensor the engine reports without a name.
    pub fn unnamed(element_type: ElementType, shape: &[i32]) -> Self {
        Self {
            name: None,
            ..Self::new("", element_type, shape)
        }
    }

    /// Report `byte_size` instead of the derived size.
    pub fn with_byte_size(mut self, byte_size: usize) -> Self {
        self.byte_size = Some(byte_size);
        self
    }

    /// Bytes the engine allocates for this tensor.
    pub fn byte_size(&self) -> usize {
        self.byte_size.unwrap_or_else(|| {
            let count: usize = self.shape.iter().map(|&d| d.max(0) as usize).product();
            count * ElementType::from(self.type_code).width()
        })
    }

    fn meta(&self) -> TensorMeta {
        TensorMeta {
            type_code: self.type_code,
            dims: self.shape.clone(),
            name: self.name.clone(),
            byte_size: self.byte_size(),
        }
    }
}

/// A serialized mock model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockGraph {
    #[serde(default)]
    pub inputs: Vec<MockTensor>,
    #[serde(default)]
    pub outputs: Vec<MockTensor>,
    #[serde(default)]
    pub op: MockOp,
    /// Refuse `allocate_tensors`.
    #[serde(default)]
    pub fail_allocate: bool,
    /// Refuse every invoke.
    #[serde(default)]
    pub fail_invoke: bool,
    /// Report a warning on every successful invoke.
    #[serde(default)]
    pub warn_on_invoke: bool,
}

impl MockGraph {
    /// Single-input, single-output echo model.
    pub fn identity(element_type: ElementType, shape: &[i32]) -> Self {
        Self {
            inputs: vec![MockTensor::new("input", element_type, shape)],
            outputs: vec![MockTensor::new("output", element_type, shape)],
            ..Self::default()
        }
    }

    /// Serialize into the bytes `create_model` accepts.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Default)]
struct MockState {
    live: usize,
    journal: Vec<String>,
    input_sizes: HashMap<usize, usize>,
    output_sizes: HashMap<usize, usize>,
}

/// Shared accounting for every handle created by one [`MockEngine`].
#[derive(Debug, Default, Clone)]
struct Ledger(Arc<Mutex<MockState>>);

impl Ledger {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: String) {
        self.state().journal.push(event);
    }

    fn acquire(&self, kind: &'static str) -> Tracked {
        {
            let mut state = self.state();
            state.live += 1;
            state.journal.push(format!("{} created", kind));
        }
        Tracked {
            ledger: self.clone(),
            kind,
        }
    }
}

/// Counts a live handle; records its release on drop.
#[derive(Debug)]
struct Tracked {
    ledger: Ledger,
    kind: &'static str,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let mut state = self.ledger.state();
        state.live -= 1;
        state.journal.push(format!("{} deleted", self.kind));
    }
}

/// In-process engine with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    ledger: Ledger,
    delegates: Vec<String>,
    rejected_options: Vec<String>,
    failing_input_copies: Vec<usize>,
    failing_output_copies: Vec<usize>,
    fail_interpreter: bool,
}

impl MockEngine {
    /// Engine with no delegates and no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a delegate library available at `path`.
    pub fn with_delegate(mut self, path: &str) -> Self {
        self.delegates.push(path.to_string());
        self
    }

    /// Refuse any delegate option with this key.
    pub fn reject_delegate_option(mut self, key: &str) -> Self {
        self.rejected_options.push(key.to_string());
        self
    }

    /// Fail copies into input tensor `index`.
    pub fn fail_input_copy(mut self, index: usize) -> Self {
        self.failing_input_copies.push(index);
        self
    }

    /// Fail copies out of output tensor `index`.
    pub fn fail_output_copy(mut self, index: usize) -> Self {
        self.failing_output_copies.push(index);
        self
    }

    /// Refuse to create interpreters.
    pub fn fail_interpreter(mut self) -> Self {
        self.fail_interpreter = true;
        self
    }

    /// From now on, report `byte_size` for input tensor `index` of every
    /// interpreter this engine created.
    pub fn resize_input(&self, index: usize, byte_size: usize) {
        self.ledger.state().input_sizes.insert(index, byte_size);
    }

    /// Output counterpart of [`resize_input`](Self::resize_input).
    pub fn resize_output(&self, index: usize, byte_size: usize) {
        self.ledger.state().output_sizes.insert(index, byte_size);
    }

    /// Number of engine handles currently alive.
    pub fn live_resources(&self) -> usize {
        self.ledger.state().live
    }

    /// Every lifecycle event so far, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.ledger.state().journal.clone()
    }
}

/// Parsed mock model.
#[derive(Debug)]
pub struct MockModel {
    graph: MockGraph,
    _tracked: Tracked,
}

/// Options collected before interpreter creation.
#[derive(Debug)]
pub struct MockOptions {
    threads: Option<i32>,
    errors: Arc<ErrorLog>,
    _tracked: Tracked,
}

impl MockOptions {
    /// Thread count set on these options, if any.
    pub fn threads(&self) -> Option<i32> {
        self.threads
    }
}

/// Delegate created from a registered path.
#[derive(Debug)]
pub struct MockDelegate {
    path: String,
    _tracked: Tracked,
}

impl MockDelegate {
    /// Library path the delegate was created from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Interpreter holding one byte buffer per tensor.
#[derive(Debug)]
pub struct MockInterpreter {
    graph: MockGraph,
    threads: Option<i32>,
    inputs: Vec<Vec<u8>>,
    outputs: Vec<Vec<u8>>,
    allocated: bool,
    failing_input_copies: Vec<usize>,
    failing_output_copies: Vec<usize>,
    errors: Arc<ErrorLog>,
    ledger: Ledger,
    _tracked: Tracked,
}

impl MockInterpreter {
    /// Thread count forwarded through the options, if any.
    pub fn threads(&self) -> Option<i32> {
        self.threads
    }
}

impl Engine for MockEngine {
    type Model = MockModel;
    type Options = MockOptions;
    type Delegate = MockDelegate;
    type Interpreter = MockInterpreter;

    fn name(&self) -> &'static str {
        "mock"
    }

    unsafe fn create_model(&self, bytes: &[u8], errors: &Arc<ErrorLog>) -> Option<MockModel> {
        if bytes.is_empty() {
            errors.push("mock: model buffer is empty");
            return None;
        }
        match serde_json::from_slice::<MockGraph>(bytes) {
            Ok(graph) => Some(MockModel {
                graph,
                _tracked: self.ledger.acquire("model"),
            }),
            Err(e) => {
                errors.push(&format!("mock: malformed model: {}", e));
                None
            }
        }
    }

    fn create_options(&self, errors: &Arc<ErrorLog>) -> Result<MockOptions> {
        Ok(MockOptions {
            threads: None,
            errors: Arc::clone(errors),
            _tracked: self.ledger.acquire("options"),
        })
    }

    fn set_num_threads(&self, options: &mut MockOptions, threads: i32) {
        self.ledger.record(format!("threads {}", threads));
        options.threads = Some(threads);
    }

    fn insert_delegate_option(
        &self,
        options: &mut DelegateOptions,
        key: &CStr,
        value: &CStr,
    ) -> Status {
        let key_str = key.to_string_lossy();
        if self.rejected_options.iter().any(|k| *k == key_str) {
            self.ledger.record(format!("delegate option {} rejected", key_str));
            return Status::DelegateError;
        }
        self.ledger
            .record(format!("delegate option {}={}", key_str, value.to_string_lossy()));
        options.insert(key, value)
    }

    fn create_delegate(
        &self,
        options: &DelegateOptions,
        _errors: &Arc<ErrorLog>,
    ) -> Result<MockDelegate> {
        let path = options.path().to_string_lossy().into_owned();
        if !self.delegates.contains(&path) {
            return Err(TfliteError::DelegateCreationFailed {
                path,
                reason: "library not found".to_string(),
            });
        }
        Ok(MockDelegate {
            path,
            _tracked: self.ledger.acquire("delegate"),
        })
    }

    unsafe fn add_delegate(&self, _options: &mut MockOptions, delegate: &MockDelegate) {
        self.ledger.record(format!("delegate attached {}", delegate.path));
    }

    fn create_interpreter(
        &self,
        model: &MockModel,
        options: &MockOptions,
    ) -> Option<MockInterpreter> {
        if self.fail_interpreter {
            options.errors.push("mock: interpreter refused");
            return None;
        }
        Some(MockInterpreter {
            graph: model.graph.clone(),
            threads: options.threads,
            inputs: Vec::new(),
            outputs: Vec::new(),
            allocated: false,
            failing_input_copies: self.failing_input_copies.clone(),
            failing_output_copies: self.failing_output_copies.clone(),
            errors: Arc::clone(&options.errors),
            ledger: self.ledger.clone(),
            _tracked: self.ledger.acquire("interpreter"),
        })
    }
}

impl EngineInterpreter for MockInterpreter {
    fn allocate_tensors(&mut self) -> Status {
        if self.graph.fail_allocate {
            self.errors.push("mock: allocation refused");
            return Status::Error;
        }
        let zeroed = |tensors: &[MockTensor]| -> Vec<Vec<u8>> {
            tensors.iter().map(|t| vec![0; t.byte_size()]).collect()
        };
        self.inputs = zeroed(&self.graph.inputs);
        self.outputs = zeroed(&self.graph.outputs);
        self.allocated = true;
        self.ledger.record("tensors allocated".to_string());
        Status::Ok
    }

    fn input_count(&self) -> usize {
        self.graph.inputs.len()
    }

    fn output_count(&self) -> usize {
        self.graph.outputs.len()
    }

    fn input_tensor(&self, index: usize) -> Option<TensorMeta> {
        let mut meta = self.graph.inputs.get(index).map(MockTensor::meta)?;
        if let Some(&size) = self.ledger.state().input_sizes.get(&index) {
            meta.byte_size = size;
        }
        Some(meta)
    }

    fn output_tensor(&self, index: usize) -> Option<TensorMeta> {
        let mut meta = self.graph.outputs.get(index).map(MockTensor::meta)?;
        if let Some(&size) = self.ledger.state().output_sizes.get(&index) {
            meta.byte_size = size;
        }
        Some(meta)
    }

    fn copy_to_input(&mut self, index: usize, src: &[u8]) -> Status {
        if self.failing_input_copies.contains(&index) {
            self.errors.push(&format!("mock: input {} copy refused", index));
            return Status::Error;
        }
        match self.inputs.get_mut(index) {
            Some(dst) if dst.len() == src.len() => {
                dst.copy_from_slice(src);
                Status::Ok
            }
            _ => {
                self.errors.push(&format!("mock: cannot copy into input {}", index));
                Status::Error
            }
        }
    }

    fn copy_from_output(&self, index: usize, dst: &mut [u8]) -> Status {
        if self.failing_output_copies.contains(&index) {
            self.errors.push(&format!("mock: output {} copy refused", index));
            return Status::Error;
        }
        match self.outputs.get(index) {
            Some(src) if src.len() == dst.len() => {
                dst.copy_from_slice(src);
                Status::Ok
            }
            _ => {
                self.errors.push(&format!("mock: cannot copy from output {}", index));
                Status::Error
            }
        }
    }

    fn invoke(&mut self) -> Status {
        if !self.allocated {
            self.errors.push("mock: invoke before allocation");
            return Status::Error;
        }
        if self.graph.fail_invoke {
            self.errors.push("mock: invoke failed");
            return Status::Error;
        }
        self.ledger.record("invoke".to_string());
        match self.graph.op {
            MockOp::Identity => {
                for (i, out) in self.outputs.iter_mut().enumerate() {
                    match self.inputs.get(i) {
                        Some(input) if input.len() == out.len() => out.copy_from_slice(input),
                        _ => {
                            self.errors
                                .push(&format!("mock: identity has no input for output {}", i));
                            return Status::Error;
                        }
                    }
                }
            }
            MockOp::Zeros => self.outputs.iter_mut().for_each(|out| out.fill(0)),
        }
        if self.graph.warn_on_invoke {
            self.errors.push("mock: invoke warning");
        }
        Status::Ok
    }
}
