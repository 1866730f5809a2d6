//! Property-based round-trip laws for the SML message codec.

use bytes::Bytes;
use proptest::prelude::*;
use smgw_proto::obis::Obis;
use smgw_proto::sml::value::Decoder;
use smgw_proto::sml::{
    AttentionResponse, CloseRequest, CloseResponse, GetListResponse, GetProcParameterRequest,
    GetProcParameterResponse, GetProfileListResponse, ListEntry, OpenRequest, OpenResponse,
    PeriodEntry, SmlBody, SmlMessage, SmlTree, SmlValue,
};

fn arb_obis() -> impl Strategy<Value = Obis> {
    any::<[u8; 6]>().prop_map(Obis::from_array)
}

fn arb_octet(max: usize) -> impl Strategy<Value = Bytes> {
    proptest::collection::vec(any::<u8>(), 1..max).prop_map(Bytes::from)
}

fn arb_value() -> impl Strategy<Value = SmlValue> {
    prop_oneof![
        Just(SmlValue::None),
        any::<bool>().prop_map(SmlValue::Bool),
        any::<u8>().prop_map(SmlValue::U8),
        any::<u32>().prop_map(SmlValue::U32),
        any::<i8>().prop_map(SmlValue::I8),
        any::<i64>().prop_map(SmlValue::I64),
        arb_octet(24).prop_map(SmlValue::Octet),
        any::<u32>().prop_map(SmlValue::Timestamp),
    ]
}

/// Trees up to depth 8.
fn arb_tree() -> impl Strategy<Value = SmlTree> {
    let leaf = (arb_obis(), arb_value()).prop_map(|(name, value)| SmlTree::leaf(name, value));
    leaf.prop_recursive(8, 48, 3, |inner| {
        (arb_obis(), proptest::collection::vec(inner, 1..3))
            .prop_map(|(name, children)| SmlTree::node(name, children))
    })
}

fn arb_trx() -> impl Strategy<Value = Bytes> {
    "[0-9]{6,8}-[0-9]{1,3}".prop_map(|s| Bytes::from(s.into_bytes()))
}

fn arb_body() -> impl Strategy<Value = SmlBody> {
    prop_oneof![
        (proptest::option::of(arb_octet(8)), arb_octet(15), proptest::option::of(arb_octet(10)))
            .prop_map(|(client_id, file_id, server_id)| {
                SmlBody::OpenRequest(OpenRequest {
                    codepage: None,
                    client_id,
                    file_id,
                    server_id,
                    name: Some("operator".into()),
                    pwd: Some("operator".into()),
                    version: Some(1),
                })
            }),
        (arb_octet(15), arb_octet(10), proptest::option::of(any::<u32>())).prop_map(
            |(file_id, server_id, ref_time)| {
                SmlBody::OpenResponse(OpenResponse {
                    codepage: None,
                    client_id: None,
                    file_id,
                    server_id,
                    ref_time,
                    version: None,
                })
            }
        ),
        Just(SmlBody::CloseRequest(CloseRequest::default())),
        Just(SmlBody::CloseResponse(CloseResponse::default())),
        (
            arb_octet(10),
            proptest::collection::vec(arb_obis(), 1..4),
            // `not set` in an optional slot decodes as absent
            proptest::option::of(arb_value().prop_filter("attribute must be set", |v| {
                *v != SmlValue::None
            })),
        )
            .prop_map(|(server_id, path, attribute)| {
                SmlBody::GetProcParameterRequest(GetProcParameterRequest {
                    server_id,
                    name: "operator".into(),
                    pwd: "operator".into(),
                    path,
                    attribute,
                })
            }),
        (arb_octet(10), proptest::collection::vec(arb_obis(), 1..4), arb_tree()).prop_map(
            |(server_id, path, tree)| {
                SmlBody::GetProcParameterResponse(GetProcParameterResponse {
                    server_id,
                    path,
                    tree,
                })
            }
        ),
        (
            arb_octet(10),
            proptest::option::of(any::<u32>()),
            any::<u32>(),
            proptest::collection::vec(arb_obis(), 1..3),
            any::<u64>(),
            proptest::collection::vec(
                (arb_obis(), any::<u8>(), any::<i8>(), arb_value()).prop_map(
                    |(name, unit, scaler, value)| PeriodEntry {
                        name,
                        unit,
                        scaler,
                        value,
                        signature: None,
                    }
                ),
                0..12
            ),
        )
            .prop_map(|(server_id, act_time, reg_period, path, status, entries)| {
                SmlBody::GetProfileListResponse(GetProfileListResponse {
                    server_id,
                    act_time,
                    reg_period,
                    path,
                    val_time: act_time,
                    status,
                    entries,
                    raw_data: None,
                    signature: None,
                })
            }),
        (
            arb_octet(10),
            proptest::collection::vec(
                (arb_obis(), proptest::option::of(any::<u8>()), proptest::option::of(any::<i8>()), arb_value())
                    .prop_map(|(name, unit, scaler, value)| ListEntry {
                        name,
                        status: None,
                        val_time: None,
                        unit,
                        scaler,
                        value,
                        signature: None,
                    }),
                0..255
            ),
        )
            .prop_map(|(server_id, entries)| {
                SmlBody::GetListResponse(GetListResponse {
                    client_id: None,
                    server_id,
                    list_name: None,
                    act_sensor_time: None,
                    entries,
                    signature: None,
                    act_gateway_time: None,
                })
            }),
        (arb_octet(10), arb_obis(), proptest::option::of("[ -~]{1,24}".prop_map(String::from)))
            .prop_map(|(server_id, code, message)| {
                SmlBody::AttentionResponse(AttentionResponse {
                    server_id,
                    code,
                    message,
                    details: None,
                })
            }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn message_round_trip(trx in arb_trx(), group in any::<u8>(), body in arb_body()) {
        let msg = SmlMessage::new(trx, group, 0, body);
        let wire = msg.encode();
        let mut dec = Decoder::new(&wire);
        let decoded = SmlMessage::decode(&mut dec).unwrap();
        prop_assert_eq!(decoded, msg);
        prop_assert_eq!(dec.remaining(), 0);
    }
}
