//! Interpreter session: builds the engine interpreter, owns the tensor
//! buffers and runs inference.

use std::sync::Arc;

use tracing::debug;

use crate::engine::{
    DelegateOptions, Engine, EngineInterpreter, ErrorLog, TensorMeta, TfliteEngine,
};
use crate::error::{Result, TfliteError};
use crate::model::ModelHandle;
use crate::options::{DelegateConfig, InterpreterOptions};
use crate::tensor::{TensorDescriptor, TensorInfo};

/// An interpreter ready to run a model.
///
/// Construction either returns a fully allocated session or releases
/// everything it acquired. Each input and output gets one [`TensorInfo`]
/// whose buffer lives as long as the session; `run()` only copies data
/// through it.
///
/// Fields drop in declaration order: the interpreter first, then the
/// buffers, the delegate, the model, the options and finally the error log
/// every engine object reports into.
pub struct Interpreter<E: Engine = TfliteEngine> {
    interpreter: E::Interpreter,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    delegate: Option<E::Delegate>,
    model: ModelHandle<E>,
    options: E::Options,
    errors: Arc<ErrorLog>,
}

impl<E: Engine> Interpreter<E> {
    /// Compile `model_bytes` and build an allocated interpreter for it.
    ///
    /// # Errors
    ///
    /// - [`TfliteError::ModelCreationFailed`] if the engine rejects the model.
    /// - [`TfliteError::DelegateOptionRejected`] or
    ///   [`TfliteError::DelegateCreationFailed`] for delegate problems.
    /// - [`TfliteError::InterpreterCreationFailed`],
    ///   [`TfliteError::TensorAllocationFailed`].
    /// - [`TfliteError::UnsupportedTensorType`] if any tensor cannot be
    ///   backed by a buffer.
    pub fn new(engine: &E, model_bytes: &[u8], options: &InterpreterOptions) -> Result<Self> {
        let errors = Arc::new(ErrorLog::new());

        let mut engine_options = engine.create_options(&errors)?;
        if let Some(threads) = options.effective_threads() {
            engine.set_num_threads(&mut engine_options, threads);
            debug!("{}: threads set to {}", engine.name(), threads);
        }

        // Keeps the option strings alive until the interpreter exists.
        let mut delegate_options = None;
        let delegate = match &options.delegate {
            Some(config) => {
                let (delegate, strings) =
                    attach_delegate(engine, &mut engine_options, config, &errors)?;
                delegate_options = Some(strings);
                Some(delegate)
            }
            None => None,
        };

        let model = ModelHandle::new(engine, model_bytes, &errors)?;

        let mut interpreter = engine
            .create_interpreter(model.compiled(), &engine_options)
            .ok_or_else(|| TfliteError::InterpreterCreationFailed { log: errors.take() })?;
        drop(delegate_options);

        let status = interpreter.allocate_tensors();
        if !status.is_ok() {
            return Err(TfliteError::TensorAllocationFailed {
                status,
                log: errors.take(),
            });
        }

        let inputs = make_tensors(
            interpreter.input_count(),
            |i| interpreter.input_tensor(i),
            "input",
        )?;
        let outputs = make_tensors(
            interpreter.output_count(),
            |i| interpreter.output_tensor(i),
            "output",
        )?;
        drain_warnings(&errors, engine.name());
        debug!(
            "{}: interpreter ready with {} inputs, {} outputs",
            engine.name(),
            inputs.len(),
            outputs.len()
        );

        Ok(Self {
            interpreter,
            inputs,
            outputs,
            delegate,
            model,
            options: engine_options,
            errors,
        })
    }

    /// Copy every input in, invoke, copy every output back.
    ///
    /// The first failure is returned. Outputs are not copied when the
    /// invocation fails. Messages the engine reported during earlier
    /// successful calls are logged and discarded first, so an error only
    /// carries what this run reported.
    pub fn run(&mut self) -> Result<()> {
        drain_warnings(&self.errors, "engine");
        for input in &self.inputs {
            input
                .buffer
                .copy_to_engine(&input.descriptor, &mut self.interpreter, &self.errors)?;
        }

        let status = self.interpreter.invoke();
        if !status.is_ok() {
            return Err(TfliteError::InvokeFailed {
                status,
                log: self.errors.take(),
            });
        }

        for output in &mut self.outputs {
            output
                .buffer
                .copy_from_engine(&output.descriptor, &self.interpreter, &self.errors)?;
        }
        Ok(())
    }

    /// Input tensors in engine order.
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    /// Output tensors in engine order.
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    /// Writable inputs, sent on the next `run()`.
    pub fn inputs_mut(&mut self) -> &mut [TensorInfo] {
        &mut self.inputs
    }

    /// Writable outputs. The next `run()` overwrites them.
    pub fn outputs_mut(&mut self) -> &mut [TensorInfo] {
        &mut self.outputs
    }

    /// Input `index`, or [`TfliteError::InvalidIndex`].
    pub fn input(&self, index: usize) -> Result<&TensorInfo> {
        let available = self.inputs.len();
        self.inputs.get(index).ok_or(TfliteError::InvalidIndex {
            requested: index,
            available,
        })
    }

    /// Output `index`, or [`TfliteError::InvalidIndex`].
    pub fn output(&self, index: usize) -> Result<&TensorInfo> {
        let available = self.outputs.len();
        self.outputs.get(index).ok_or(TfliteError::InvalidIndex {
            requested: index,
            available,
        })
    }

    /// Mutable counterpart of [`input`](Self::input).
    pub fn input_mut(&mut self, index: usize) -> Result<&mut TensorInfo> {
        let available = self.inputs.len();
        self.inputs.get_mut(index).ok_or(TfliteError::InvalidIndex {
            requested: index,
            available,
        })
    }

    /// Mutable counterpart of [`output`](Self::output).
    pub fn output_mut(&mut self, index: usize) -> Result<&mut TensorInfo> {
        let available = self.outputs.len();
        self.outputs.get_mut(index).ok_or(TfliteError::InvalidIndex {
            requested: index,
            available,
        })
    }

    /// Engine messages reported since the last error was built.
    pub fn take_error_log(&self) -> String {
        self.errors.take()
    }

    /// The compiled model and its bytes.
    pub fn model(&self) -> &ModelHandle<E> {
        &self.model
    }

    /// The attached delegate, if one was configured.
    pub fn delegate(&self) -> Option<&E::Delegate> {
        self.delegate.as_ref()
    }

    /// Underlying engine interpreter.
    pub fn engine_interpreter(&self) -> &E::Interpreter {
        &self.interpreter
    }

    /// Options the interpreter was created with.
    pub fn engine_options(&self) -> &E::Options {
        &self.options
    }

    /// Release every engine resource.
    pub fn close(self) {
        debug!("closing interpreter");
    }
}

fn attach_delegate<E: Engine>(
    engine: &E,
    engine_options: &mut E::Options,
    config: &DelegateConfig,
    errors: &Arc<ErrorLog>,
) -> Result<(E::Delegate, DelegateOptions)> {
    let mut delegate_options = DelegateOptions::new(&config.path)?;
    for (key, value) in config.c_options()? {
        let status = engine.insert_delegate_option(&mut delegate_options, &key, &value);
        if !status.is_ok() {
            return Err(TfliteError::DelegateOptionRejected {
                key: key.to_string_lossy().into_owned(),
                status,
                log: errors.take(),
            });
        }
    }

    let delegate = engine.create_delegate(&delegate_options, errors)?;
    // SAFETY: the session declares the delegate after the interpreter, so it
    // is dropped only once the interpreter is gone.
    unsafe { engine.add_delegate(engine_options, &delegate) };
    debug!(
        "{}: attached delegate {} with {} options",
        engine.name(),
        config.path,
        delegate_options.len()
    );
    Ok((delegate, delegate_options))
}

/// Discard messages reported by calls that succeeded.
fn drain_warnings(errors: &ErrorLog, source: &str) {
    let pending = errors.take();
    if !pending.is_empty() {
        debug!("{} reported: {}", source, pending.trim_end());
    }
}

fn make_tensors<F>(count: usize, meta: F, kind: &str) -> Result<Vec<TensorInfo>>
where
    F: Fn(usize) -> Option<TensorMeta>,
{
    (0..count)
        .map(|index| {
            let meta = meta(index).ok_or_else(|| {
                TfliteError::invariant(format!(
                    "engine reported no {} tensor at index {}",
                    kind, index
                ))
            })?;
            TensorInfo::new(TensorDescriptor::from_meta(&meta, index))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockGraph;
    use crate::engine::MockEngine;
    use crate::tensor::ElementType;

    fn identity_bytes() -> Vec<u8> {
        MockGraph::identity(ElementType::Float32, &[1, 3])
            .to_bytes()
            .unwrap()
    }

    fn build(engine: &MockEngine, options: &InterpreterOptions) -> Interpreter<MockEngine> {
        Interpreter::new(engine, &identity_bytes(), options).unwrap()
    }

    #[test]
    fn test_index_accessors() {
        let engine = MockEngine::new();
        let mut session = build(&engine, &InterpreterOptions::new());
        assert_eq!(session.input(0).unwrap().name(), "input");
        assert_eq!(session.output(0).unwrap().name(), "output");
        assert!(matches!(
            session.input(1),
            Err(TfliteError::InvalidIndex { requested: 1, available: 1 })
        ));
        assert!(session.output_mut(5).is_err());
        assert!(session.input_mut(0).is_ok());
    }

    #[test]
    fn test_owned_handles_are_exposed() {
        let engine = MockEngine::new().with_delegate("libdelegate.so");
        let options = InterpreterOptions::new()
            .with_threads(2)
            .with_delegate(DelegateConfig::new("libdelegate.so"));
        let session = build(&engine, &options);
        assert_eq!(session.model().bytes(), identity_bytes().as_slice());
        assert_eq!(session.model().len(), identity_bytes().len());
        assert_eq!(session.delegate().map(|d| d.path()), Some("libdelegate.so"));
        assert_eq!(session.engine_options().threads(), Some(2));

        let plain = build(&engine, &InterpreterOptions::new());
        assert!(plain.delegate().is_none());
        assert_eq!(plain.engine_options().threads(), None);
    }

    #[test]
    fn test_run_starts_with_empty_log() {
        let engine = MockEngine::new();
        let errors = Arc::new(ErrorLog::new());
        errors.push("stale warning");
        drain_warnings(&errors, "mock");
        assert!(errors.is_empty());

        let mut session = build(&engine, &InterpreterOptions::new());
        session.errors.push("left over");
        session.run().unwrap();
        assert_eq!(session.take_error_log(), "");
    }

    #[test]
    fn test_missing_tensor_meta_is_invariant_violation() {
        let meta = |i: usize| {
            (i == 0).then(|| TensorMeta {
                type_code: ElementType::UInt8.code(),
                dims: vec![1],
                name: Some("a".to_string()),
                byte_size: 1,
            })
        };
        let err = make_tensors(2, meta, "input").unwrap_err();
        assert!(matches!(err, TfliteError::InvariantViolation(_)));
        assert_eq!(make_tensors(1, meta, "input").unwrap().len(), 1);
    }

    #[test]
    fn test_close_releases_everything() {
        let engine = MockEngine::new();
        let session = build(&engine, &InterpreterOptions::new());
        assert_eq!(engine.live_resources(), 3);
        session.close();
        assert_eq!(engine.live_resources(), 0);
    }
}
