use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use tflite_rs::engine::mock::{MockGraph, MockOp, MockTensor};
use tflite_rs::error::CopyDirection;
use tflite_rs::{
    DelegateConfig, ElementType, Interpreter, InterpreterOptions, MockEngine, Status, TensorView,
    TensorViewMut, TfliteError,
};

fn identity_model() -> Result<Vec<u8>> {
    Ok(MockGraph::identity(ElementType::Float32, &[1, 4]).to_bytes()?)
}

fn two_input_model() -> Result<Vec<u8>> {
    let graph = MockGraph {
        inputs: vec![
            MockTensor::new("image", ElementType::UInt8, &[2, 2]),
            MockTensor::unnamed(ElementType::Int64, &[3]),
        ],
        outputs: vec![
            MockTensor::new("pixels", ElementType::UInt8, &[2, 2]),
            MockTensor::new("ids", ElementType::Int64, &[3]),
        ],
        ..MockGraph::default()
    };
    Ok(graph.to_bytes()?)
}

#[test]
fn identity_round_trip() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new())?;

    let input = session.input_mut(0)?;
    assert_eq!(input.data_type(), ElementType::Float32);
    assert_eq!(input.shape(), &[1, 4]);
    input
        .data_mut()
        .as_slice_mut::<f32>()
        .context("input is not f32")?
        .copy_from_slice(&[0.5, -1.25, 3.0, 7.75]);

    session.run()?;

    let output = session.output(0)?.array::<f32>()?;
    assert_eq!(output.shape(), &[1, 4]);
    let expected = [0.5, -1.25, 3.0, 7.75];
    for (v, exp) in output.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*v, *exp, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn tensors_are_enumerated_in_order() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &two_input_model()?, &InterpreterOptions::new())?;

    let names: Vec<_> = session
        .inputs()
        .iter()
        .map(|t| (t.id(), t.name().to_string()))
        .collect();
    assert_eq!(names, vec![(0, "image".to_string()), (1, "unknown tensor".to_string())]);
    let ids = session.inputs()[1].data().view();
    assert!(matches!(ids, TensorView::I64(v) if v.len() == 3));

    session.inputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[1.0, 2.0, 3.0, 255.0], "image")?;
    session.inputs_mut()[1]
        .data_mut()
        .fill_from_f64(&[-7.0, 0.0, 9.0], "ids")?;
    session.run()?;

    let pixels = session.outputs()[0].data().as_slice::<u8>();
    assert_eq!(pixels, Some(&[1u8, 2, 3, 255][..]));
    let ids = session.outputs()[1].data().as_slice::<i64>();
    assert_eq!(ids, Some(&[-7i64, 0, 9][..]));
    Ok(())
}

#[test]
fn buffers_keep_identity_across_runs() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new())?;

    let input_ptr = session.inputs()[0].data().as_bytes().as_ptr();
    let output_ptr = session.outputs()[0].data().as_bytes().as_ptr();

    for round in 0..3 {
        let value = round as f32;
        session.inputs_mut()[0]
            .data_mut()
            .as_slice_mut::<f32>()
            .context("input is not f32")?
            .fill(value);
        session.run()?;
        let out = session.outputs()[0]
            .data()
            .as_slice::<f32>()
            .context("output is not f32")?;
        assert!(out.iter().all(|&v| v == value));
        assert_eq!(session.inputs()[0].data().as_bytes().as_ptr(), input_ptr);
        assert_eq!(session.outputs()[0].data().as_bytes().as_ptr(), output_ptr);
    }
    Ok(())
}

#[test]
fn zeros_op_overwrites_outputs() -> Result<()> {
    let engine = MockEngine::new();
    let graph = MockGraph {
        op: MockOp::Zeros,
        ..MockGraph::identity(ElementType::Int32, &[3])
    };
    let mut session = Interpreter::new(&engine, &graph.to_bytes()?, &InterpreterOptions::new())?;
    session.outputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[1.0, 2.0, 3.0], "output")?;
    session.run()?;
    assert_eq!(session.outputs()[0].data().to_f64_vec(), vec![0.0; 3]);
    Ok(())
}

#[test]
fn teardown_releases_in_order() -> Result<()> {
    let engine = MockEngine::new().with_delegate("libdelegate.so");
    let options = InterpreterOptions::new()
        .with_threads(2)
        .with_delegate(DelegateConfig::new("libdelegate.so").with_option("cache", "on"));

    let mut session = Interpreter::new(&engine, &identity_model()?, &options)?;
    session.run()?;
    assert_eq!(engine.live_resources(), 4);
    drop(session);
    assert_eq!(engine.live_resources(), 0);

    assert_eq!(
        engine.journal(),
        vec![
            "options created",
            "threads 2",
            "delegate option cache=on",
            "delegate created",
            "delegate attached libdelegate.so",
            "model created",
            "interpreter created",
            "tensors allocated",
            "invoke",
            "interpreter deleted",
            "delegate deleted",
            "model deleted",
            "options deleted",
        ]
    );
    Ok(())
}

#[test]
fn empty_model_fails_without_leaks() {
    let engine = MockEngine::new();
    let err = Interpreter::new(&engine, &[], &InterpreterOptions::new()).err();
    assert!(matches!(err, Some(TfliteError::ModelCreationFailed { .. })));
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn malformed_model_reports_engine_text() {
    let engine = MockEngine::new();
    let err = Interpreter::new(&engine, b"\x00\x01garbage", &InterpreterOptions::new()).err();
    match err {
        Some(TfliteError::ModelCreationFailed { log }) => assert!(log.contains("malformed model")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn unsupported_tensor_type_aborts_construction() -> Result<()> {
    let engine = MockEngine::new().with_delegate("d.so");
    let graph = MockGraph {
        inputs: vec![MockTensor::new("ok", ElementType::Float32, &[2])],
        outputs: vec![MockTensor::new("half", ElementType::Float16, &[2]).with_byte_size(4)],
        ..MockGraph::default()
    };
    let options = InterpreterOptions::new().with_delegate(DelegateConfig::new("d.so"));
    let err = Interpreter::new(&engine, &graph.to_bytes()?, &options).err();
    match err {
        Some(TfliteError::UnsupportedTensorType { name, element_type }) => {
            assert_eq!(name, "half");
            assert_eq!(element_type, ElementType::Float16);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(engine.live_resources(), 0);
    assert_eq!(engine.journal().last().map(String::as_str), Some("options deleted"));
    Ok(())
}

#[test]
fn delegate_options_apply_in_order_without_rollback() -> Result<()> {
    let engine = MockEngine::new()
        .with_delegate("d.so")
        .reject_delegate_option("key2");
    let options = InterpreterOptions::new().with_delegate(
        DelegateConfig::new("d.so")
            .with_option("key1", "val1")
            .with_option("key2", "val2")
            .with_option("key3", "val3"),
    );

    let err = Interpreter::new(&engine, &identity_model()?, &options).err();
    match err {
        Some(TfliteError::DelegateOptionRejected { key, status, .. }) => {
            assert_eq!(key, "key2");
            assert_eq!(status, Status::DelegateError);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let journal = engine.journal();
    assert_eq!(
        journal,
        vec![
            "options created",
            "delegate option key1=val1",
            "delegate option key2 rejected",
            "options deleted",
        ]
    );
    assert_eq!(engine.live_resources(), 0);
    Ok(())
}

#[test]
fn missing_delegate_library_fails() -> Result<()> {
    let engine = MockEngine::new();
    let missing = "/missing/libdelegate.so";
    let options = InterpreterOptions::new().with_delegate(DelegateConfig::new(missing));
    let err = Interpreter::new(&engine, &identity_model()?, &options).err();
    assert!(matches!(
        err,
        Some(TfliteError::DelegateCreationFailed { ref path, .. }) if path == missing
    ));
    assert_eq!(engine.live_resources(), 0);
    Ok(())
}

#[test]
fn thread_count_forwarding() -> Result<()> {
    let cases = [(None, None), (Some(0), None), (Some(-2), None), (Some(3), Some(3))];
    for (threads, expected) in cases {
        let engine = MockEngine::new();
        let options = InterpreterOptions { threads, delegate: None };
        let session = Interpreter::new(&engine, &identity_model()?, &options)?;
        assert_eq!(session.engine_interpreter().threads(), expected, "{:?}", threads);
        let forwarded = engine.journal().iter().any(|e| e.starts_with("threads"));
        assert_eq!(forwarded, expected.is_some());
    }
    Ok(())
}

#[test]
fn interpreter_creation_failure() -> Result<()> {
    let engine = MockEngine::new().fail_interpreter();
    let err = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new()).err();
    match err {
        Some(TfliteError::InterpreterCreationFailed { log }) => {
            assert!(log.contains("interpreter refused"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(engine.live_resources(), 0);
    Ok(())
}

#[test]
fn allocation_failure() -> Result<()> {
    let engine = MockEngine::new();
    let graph = MockGraph {
        fail_allocate: true,
        ..MockGraph::identity(ElementType::UInt8, &[4])
    };
    let err = Interpreter::new(&engine, &graph.to_bytes()?, &InterpreterOptions::new()).err();
    match err {
        Some(TfliteError::TensorAllocationFailed { status, log }) => {
            assert_eq!(status, Status::Error);
            assert!(log.contains("allocation refused"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(engine.live_resources(), 0);
    Ok(())
}

#[test]
fn invoke_failure_skips_output_copy() -> Result<()> {
    let engine = MockEngine::new();
    let graph = MockGraph {
        fail_invoke: true,
        ..MockGraph::identity(ElementType::Float32, &[2])
    };
    let mut session = Interpreter::new(&engine, &graph.to_bytes()?, &InterpreterOptions::new())?;
    session.outputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[9.0, 9.0], "output")?;
    session.inputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[1.0, 2.0], "input")?;

    let err = session.run().err();
    match err {
        Some(TfliteError::InvokeFailed { status, log }) => {
            assert_eq!(status, Status::Error);
            assert!(log.contains("invoke failed"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(session.outputs()[0].data().to_f64_vec(), vec![9.0, 9.0]);
    assert_eq!(session.take_error_log(), "");
    Ok(())
}

#[test]
fn output_copy_failure_is_reported() -> Result<()> {
    let engine = MockEngine::new().fail_output_copy(1);
    let mut session = Interpreter::new(&engine, &two_input_model()?, &InterpreterOptions::new())?;
    let err = session.run().err();
    match err {
        Some(TfliteError::CopyFailed { name, direction, reason }) => {
            assert_eq!(name, "ids");
            assert_eq!(direction, CopyDirection::FromEngine);
            assert!(reason.contains("output 1 copy refused"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    Ok(())
}

#[test]
fn input_copy_failure_stops_before_invoke() -> Result<()> {
    let engine = MockEngine::new().fail_input_copy(0);
    let mut session = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new())?;
    session.outputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[9.0; 4], "output")?;

    let err = session.run().err();
    match err {
        Some(TfliteError::CopyFailed { name, direction, reason }) => {
            assert_eq!(name, "input");
            assert_eq!(direction, CopyDirection::ToEngine);
            assert!(reason.starts_with(Status::Error.describe()), "{}", reason);
            assert!(reason.contains("input 0 copy refused"), "{}", reason);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!engine.journal().iter().any(|e| e == "invoke"));
    assert_eq!(session.outputs()[0].data().to_f64_vec(), vec![9.0; 4]);
    Ok(())
}

#[test]
fn input_size_change_is_copy_failure() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new())?;
    session.outputs_mut()[0]
        .data_mut()
        .fill_from_f64(&[9.0; 4], "output")?;
    engine.resize_input(0, 8);

    let err = session.run().err();
    match err {
        Some(TfliteError::CopyFailed { direction, reason, .. }) => {
            assert_eq!(direction, CopyDirection::ToEngine);
            assert_eq!(reason, "byte size mismatch (local 16 bytes, engine 8 bytes)");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!engine.journal().iter().any(|e| e == "invoke"));
    assert_eq!(session.outputs()[0].data().to_f64_vec(), vec![9.0; 4]);
    Ok(())
}

#[test]
fn output_size_change_is_copy_failure() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &identity_model()?, &InterpreterOptions::new())?;
    engine.resize_output(0, 4);

    let err = session.run().err();
    match err {
        Some(TfliteError::CopyFailed { name, direction, reason }) => {
            assert_eq!(name, "output");
            assert_eq!(direction, CopyDirection::FromEngine);
            assert_eq!(reason, "byte size mismatch (local 16 bytes, engine 4 bytes)");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(engine.journal().iter().any(|e| e == "invoke"));
    Ok(())
}

#[test]
fn typed_view_writes_reach_the_engine() -> Result<()> {
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &two_input_model()?, &InterpreterOptions::new())?;

    match session.input_mut(0)?.data_mut().view_mut() {
        TensorViewMut::U8(v) => v.copy_from_slice(&[4, 3, 2, 1]),
        other => panic!("unexpected view: {:?}", other),
    }
    session.input_mut(1)?.array_mut::<i64>()?[[2]] = 42;
    session.run()?;

    let echoed = session.output(0)?.data().as_slice::<u8>();
    assert_eq!(echoed, Some(&[4u8, 3, 2, 1][..]));
    let ids = session.output(1)?.array::<i64>()?;
    assert_eq!(ids.as_slice(), Some(&[0i64, 0, 42][..]));
    Ok(())
}

#[test]
fn warnings_are_dropped_between_runs() -> Result<()> {
    let graph = MockGraph {
        warn_on_invoke: true,
        ..MockGraph::identity(ElementType::Float32, &[2])
    };
    let engine = MockEngine::new();
    let mut session = Interpreter::new(&engine, &graph.to_bytes()?, &InterpreterOptions::new())?;
    session.run()?;
    session.run()?;
    assert_eq!(session.take_error_log(), "mock: invoke warning\n");
    Ok(())
}

#[test]
fn engine_byte_size_mismatch_is_invariant_violation() -> Result<()> {
    let engine = MockEngine::new();
    let graph = MockGraph {
        inputs: vec![MockTensor::new("odd", ElementType::Float32, &[3]).with_byte_size(10)],
        ..MockGraph::default()
    };
    let err = Interpreter::new(&engine, &graph.to_bytes()?, &InterpreterOptions::new()).err();
    assert!(matches!(err, Some(TfliteError::InvariantViolation(_))));
    assert_eq!(engine.live_resources(), 0);
    Ok(())
}

#[test]
fn sessions_are_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Interpreter<MockEngine>>();
}
