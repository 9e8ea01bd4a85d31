//! Property tests: every valid message survives an encode/decode cycle.

use mqttsn_codec::{
    Connect, Disconnect, Integrity, Message, PingReq, ProtectionScheme, PubAck, Publish, QoS,
    RegAck, Register, ReturnCode, SubAck, Subscribe, TopicIdType, TopicSpec, UnsubAck,
    Unsubscribe,
};
use proptest::prelude::*;

fn qos_strategy() -> impl Strategy<Value = QoS> {
    prop_oneof![
        Just(QoS::AtMostOnce),
        Just(QoS::AtLeastOnce),
        Just(QoS::ExactlyOnce),
    ]
}

fn topic_id_type_strategy() -> impl Strategy<Value = TopicIdType> {
    prop_oneof![
        Just(TopicIdType::Normal),
        Just(TopicIdType::Predefined),
        Just(TopicIdType::Short),
    ]
}

fn return_code_strategy() -> impl Strategy<Value = ReturnCode> {
    prop_oneof![
        Just(ReturnCode::Accepted),
        Just(ReturnCode::Congestion),
        Just(ReturnCode::InvalidTopicId),
        Just(ReturnCode::NotSupported),
    ]
}

fn scheme_strategy() -> impl Strategy<Value = ProtectionScheme> {
    prop_oneof![
        Just(ProtectionScheme::HmacSha3_256),
        Just(ProtectionScheme::Cmac128),
        Just(ProtectionScheme::Cmac256),
        Just(ProtectionScheme::AesCcm64_128),
        Just(ProtectionScheme::AesCcm128_256),
        Just(ProtectionScheme::AesGcm128_128),
        Just(ProtectionScheme::AesGcm256_128),
        Just(ProtectionScheme::ChaCha20Poly1305),
    ]
}

fn topic_name_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9/+#]{1,64}"
}

proptest! {
    #[test]
    fn publish_round_trips(
        dup in any::<bool>(),
        qos in qos_strategy(),
        retain in any::<bool>(),
        topic_id_type in topic_id_type_strategy(),
        topic_id in any::<u16>(),
        msg_id in any::<u16>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let message = Message::Publish(Publish {
            dup, qos, retain, topic_id_type, topic_id, msg_id, payload,
        });
        let frame = message.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn connect_round_trips(
        will in any::<bool>(),
        clean_session in any::<bool>(),
        duration in any::<u16>(),
        client_id in "[a-zA-Z0-9_-]{1,64}",
    ) {
        let message = Message::Connect(Connect { will, clean_session, duration, client_id });
        let frame = message.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn register_family_round_trips(
        topic_id in any::<u16>(),
        msg_id in any::<u16>(),
        topic_name in topic_name_strategy(),
        return_code in return_code_strategy(),
    ) {
        let register = Message::Register(Register {
            topic_id, msg_id, topic_name,
        });
        let frame = register.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), register);

        let regack = Message::RegAck(RegAck { topic_id, msg_id, return_code });
        let frame = regack.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), regack);

        let puback = Message::PubAck(PubAck { topic_id, msg_id, return_code });
        let frame = puback.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), puback);
    }

    #[test]
    fn subscribe_family_round_trips(
        dup in any::<bool>(),
        qos in qos_strategy(),
        msg_id in any::<u16>(),
        topic_name in topic_name_strategy(),
        predefined in any::<u16>(),
        return_code in return_code_strategy(),
    ) {
        for topic in [
            TopicSpec::Name(topic_name.clone()),
            TopicSpec::Predefined(predefined),
            TopicSpec::Short(*b"xy"),
        ] {
            let subscribe = Message::Subscribe(Subscribe {
                dup, qos, msg_id, topic: topic.clone(),
            });
            let frame = subscribe.encode().unwrap();
            prop_assert_eq!(Message::decode(&frame).unwrap(), subscribe);

            let unsubscribe = Message::Unsubscribe(Unsubscribe { msg_id, topic });
            let frame = unsubscribe.encode().unwrap();
            prop_assert_eq!(Message::decode(&frame).unwrap(), unsubscribe);
        }

        let suback = Message::SubAck(SubAck {
            qos, topic_id: predefined, msg_id, return_code,
        });
        let frame = suback.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), suback);

        let unsuback = Message::UnsubAck(UnsubAck { msg_id });
        let frame = unsuback.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), unsuback);
    }

    #[test]
    fn integrity_round_trips(
        scheme in scheme_strategy(),
        sender in proptest::collection::vec(any::<u8>(), 8),
        nonce in any::<u32>(),
        key_material in any::<u32>(),
        counter in any::<u32>(),
        tag_words in 0usize..=15,
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let inner = Message::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic_id_type: TopicIdType::Normal,
            topic_id: 1,
            msg_id: 0,
            payload,
        });
        let mut sender_id = [0u8; 8];
        sender_id.copy_from_slice(&sender);
        let message = Message::Integrity(Integrity {
            scheme,
            sender_id,
            nonce,
            key_material,
            counter,
            encapsulated: inner.encode().unwrap().to_vec(),
            auth_tag: vec![0xEE; tag_words * 4],
        });
        let frame = message.encode().unwrap();
        prop_assert_eq!(Message::decode(&frame).unwrap(), message);
    }

    #[test]
    fn truncation_never_panics(
        payload in proptest::collection::vec(any::<u8>(), 0..64),
        cut in 0usize..64,
    ) {
        let message = Message::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic_id_type: TopicIdType::Normal,
            topic_id: 3,
            msg_id: 11,
            payload,
        });
        let frame = message.encode().unwrap();
        let cut = cut.min(frame.len());
        // may fail, must not panic
        let _ = Message::decode(&frame[..cut]);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = Message::decode(&bytes);
    }
}

#[test]
fn disconnect_and_pingreq_optional_fields() {
    for message in [
        Message::Disconnect(Disconnect { duration: None }),
        // an explicit zero is a distinct wire form from the empty body
        Message::Disconnect(Disconnect { duration: Some(0) }),
        Message::Disconnect(Disconnect { duration: Some(300) }),
        Message::PingReq(PingReq { client_id: None }),
        Message::PingReq(PingReq {
            client_id: Some("sleepy-device".into()),
        }),
    ] {
        let frame = message.encode().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), message);
    }
}

// The integrity scenario from the interoperability checklist: ChaCha20-
// Poly1305, 16-byte tag, u32 key material, u16 counter, wrapped PUBLISH.
#[test]
fn integrity_envelope_wrapping_publish() {
    let publish = Message::Publish(Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic_id_type: TopicIdType::Normal,
        topic_id: 0x0001,
        msg_id: 7,
        payload: vec![0x41, 0x42],
    });
    let envelope = Integrity {
        scheme: ProtectionScheme::ChaCha20Poly1305,
        sender_id: *b"sensor-a",
        nonce: 0x1122_3344,
        key_material: 0x0102_0304,
        counter: 0x0005,
        encapsulated: publish.encode().unwrap().to_vec(),
        auth_tag: (0..16).collect(),
    };

    let frame = Message::Integrity(envelope.clone()).encode().unwrap();
    let decoded = match Message::decode(&frame).unwrap() {
        Message::Integrity(decoded) => decoded,
        other => panic!("unexpected message {other:?}"),
    };

    assert_eq!(decoded.scheme, ProtectionScheme::ChaCha20Poly1305);
    assert_eq!(decoded.sender_id, *b"sensor-a");
    assert_eq!(decoded.nonce, 0x1122_3344);
    assert_eq!(decoded.key_material, 0x0102_0304);
    assert_eq!(decoded.counter, 0x0005);
    assert_eq!(decoded.auth_tag.len(), 16);
    assert_eq!(decoded.inner().unwrap(), publish);
    assert_eq!(decoded, envelope);
}
