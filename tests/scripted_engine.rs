mod common;

use acoustic_bridge::{Bridge, BridgeError, Config, SampleFormat, Waveform};
use common::ScriptedEngine;

fn bridge_with(engine: ScriptedEngine) -> Bridge<ScriptedEngine> {
    Bridge::with_engine(engine, Config::builtin())
}

#[test]
fn consistent_engine_output_is_accepted() {
    let mut bridge = bridge_with(ScriptedEngine::consistent(512, 2));
    let handle = bridge.create_instance(48000, 1024).unwrap();
    let waveform = bridge.encode(handle, b"x", 1, 10).unwrap();
    assert_eq!(waveform.len(), 512);
    assert_eq!(waveform.as_i16().unwrap()[0], 0x1111);
    assert_eq!(bridge.engine().encode_calls, 2);
}

#[test]
fn fill_that_disagrees_with_query_is_rejected() {
    let mut bridge = bridge_with(ScriptedEngine {
        query_bytes: 2048,
        fill_samples: 1000,
        ..ScriptedEngine::default()
    });
    let handle = bridge.create_instance(48000, 1024).unwrap();
    assert_eq!(
        bridge.encode(handle, b"x", 1, 10),
        Err(BridgeError::EncodeConsistency {
            expected_bytes: 2048,
            actual_samples: 1000,
            width: 2,
        })
    );
    assert_eq!(bridge.outstanding_views(), 0);
}

#[test]
fn width_is_part_of_the_consistency_check() {
    let mut bridge = bridge_with(ScriptedEngine::consistent(256, 2));
    let handle = bridge
        .create_instance_with_format(48000, 1024, SampleFormat::F32)
        .unwrap();
    // 512 bytes hold 128 float samples, not 256.
    assert!(matches!(
        bridge.encode(handle, b"x", 1, 10),
        Err(BridgeError::EncodeConsistency { width: 4, .. })
    ));
}

#[test]
fn non_positive_query_is_a_size_failure() {
    for size in [0, -3] {
        let mut bridge = bridge_with(ScriptedEngine {
            query_bytes: size,
            ..ScriptedEngine::default()
        });
        let handle = bridge.create_instance(48000, 1024).unwrap();
        assert_eq!(
            bridge.encode(handle, b"x", 1, 10),
            Err(BridgeError::EncodeSize { size })
        );
        // The fill phase never runs.
        assert_eq!(bridge.engine().encode_calls, 1);
    }
}

#[test]
fn invalid_handle_and_protocol_never_reach_the_engine() {
    let mut bridge = bridge_with(ScriptedEngine::consistent(16, 2));
    let handle = bridge.create_instance(48000, 1024).unwrap();
    assert!(bridge.encode(handle, b"x", 42, 10).is_err());
    bridge.destroy_instance(handle).unwrap();
    assert!(bridge.encode(handle, b"x", 1, 10).is_err());
    assert!(bridge.decode(handle, &Waveform::I16(vec![0; 8])).is_err());
    assert_eq!(bridge.engine().encode_calls, 0);
    assert_eq!(bridge.engine().decode_calls, 0);
}

#[test]
fn engine_refusal_is_a_creation_failure() {
    let mut bridge = bridge_with(ScriptedEngine {
        init_result: -2,
        ..ScriptedEngine::default()
    });
    assert_eq!(
        bridge.create_instance(48000, 1024),
        Err(BridgeError::CreationFailed { code: -2 })
    );
    assert_eq!(bridge.live_instances(), 0);
}

#[test]
fn panics_become_errors() {
    let mut bridge = bridge_with(ScriptedEngine {
        panic_in: Some("init"),
        ..ScriptedEngine::default()
    });
    assert_eq!(
        bridge.create_instance(48000, 1024),
        Err(BridgeError::NativePanic { operation: "init" })
    );

    let mut bridge = bridge_with(ScriptedEngine {
        panic_in: Some("encode"),
        ..ScriptedEngine::consistent(16, 2)
    });
    let handle = bridge.create_instance(48000, 1024).unwrap();
    assert_eq!(
        bridge.encode(handle, b"x", 1, 10),
        Err(BridgeError::NativePanic { operation: "encode" })
    );
    let mut out = vec![0i16; 64];
    assert!(bridge.encode_into(handle, b"x", 1, 10, &mut out).is_err());
    assert_eq!(bridge.outstanding_views(), 0);
    assert_eq!(bridge.ledger().commits(), 0);
}

#[test]
fn decoded_text_drops_trailing_nuls() {
    let mut bridge = bridge_with(ScriptedEngine {
        decode_message: Some(b"HELLO\0\0".to_vec()),
        ..ScriptedEngine::default()
    });
    let handle = bridge.create_instance(48000, 1024).unwrap();
    let captured = Waveform::I16(vec![0; 1024]);
    assert_eq!(bridge.decode(handle, &captured), Ok(Some("HELLO".to_string())));
    assert_eq!(
        bridge.decode_bytes(handle, &captured),
        Ok(Some(b"HELLO\0\0".to_vec()))
    );
}

#[test]
fn decoded_length_beyond_the_buffer_is_an_error() {
    let mut bridge = bridge_with(ScriptedEngine {
        decode_message: Some(b"HELLO".to_vec()),
        decode_claim: Some(300),
        ..ScriptedEngine::default()
    });
    let handle = bridge.create_instance(48000, 1024).unwrap();
    let captured = Waveform::I16(vec![0; 1024]);
    assert!(matches!(
        bridge.decode_bytes(handle, &captured),
        Err(BridgeError::Marshal(_))
    ));
    assert_eq!(bridge.outstanding_views(), 0);
}

#[test]
fn destroy_frees_the_native_instance_once() {
    let mut bridge = bridge_with(ScriptedEngine {
        init_result: 7,
        ..ScriptedEngine::default()
    });
    let handle = bridge.create_instance(48000, 1024).unwrap();
    bridge.destroy_instance(handle).unwrap();
    assert!(bridge.destroy_instance(handle).is_err());
    assert_eq!(bridge.engine().freed, vec![7]);
}
