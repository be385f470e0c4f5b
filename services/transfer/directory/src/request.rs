//! Server-list request and response bodies.
//!
//! Both directions share one layout: a 4-byte big-endian length that counts
//! itself, followed by a JCE request envelope, the whole thing TEA-encrypted.

use crate::address::{IpField, ServerEntry};
use crate::error::DirectoryError;
use bytes::{BufMut, Bytes, BytesMut};
use msf_wire::{
    decode_struct, decode_wrapper, encode_wrapper, ClientIdentity, JceStruct, JceValue, TeaKey,
    WrapperMeta,
};

/// Servant the server-list request is addressed to
pub const SERVICE_NAME: &str = "ConfigHttp";
/// Function name of the server-list request
pub const METHOD_NAME: &str = "HttpServerListReq";
/// Function name the server answers with
pub const RESPONSE_NAME: &str = "HttpServerListRes";

const LENGTH_PREFIX: usize = 4;
const SERVER_LIST_TAG: u8 = 2;

/// Fields of the server-list request
pub fn request_struct(identity: &ClientIdentity) -> JceStruct {
    let mut fields: Vec<Option<JceValue>> = vec![
        None,
        Some(JceValue::Int(identity.uin as i64)),
        Some(0.into()),
        Some(1.into()),
        Some("00000".into()),
        Some(100.into()),
        Some(identity.sub_app_id.into()),
        Some(identity.imei.as_str().into()),
    ];
    // Tags 8 through 13 are unused and sent as zero
    fields.extend((8..14).map(|_| Some(JceValue::Int(0))));
    fields.push(Some(1.into()));

    JceStruct::from_positional(fields)
}

/// Plaintext request body: length prefix plus envelope
pub fn encode_request(identity: &ClientIdentity) -> Bytes {
    let body = request_struct(identity);
    let envelope = encode_wrapper(
        &[(METHOD_NAME, &body)],
        &WrapperMeta::new(SERVICE_NAME, METHOD_NAME),
    );
    with_length_prefix(&envelope)
}

/// Encrypted request body, ready to POST
pub fn encrypt_request(identity: &ClientIdentity, key: &TeaKey) -> Vec<u8> {
    key.encrypt(&encode_request(identity))
}

/// Decrypt a response body and extract the server list in wire order
pub fn parse_response(body: &[u8], key: &TeaKey) -> Result<Vec<ServerEntry>, DirectoryError> {
    let plain = key.decrypt(body)?;
    if plain.len() < LENGTH_PREFIX {
        return Err(DirectoryError::Malformed("response shorter than length prefix"));
    }

    let payload = decode_wrapper(&plain[LENGTH_PREFIX..])?;
    let list = payload
        .get(SERVER_LIST_TAG)
        .and_then(JceValue::as_list)
        .ok_or(DirectoryError::Malformed("server list missing"))?;

    list.iter().map(parse_entry).collect()
}

/// Encrypted response body as the directory server produces it
pub fn encrypt_response(entries: &[(IpField, u16)], key: &TeaKey) -> Vec<u8> {
    let list = entries
        .iter()
        .map(|(ip, port)| {
            let address = match ip {
                IpField::Packed(raw) => JceValue::Int(i64::from(*raw)),
                IpField::Dotted(text) => JceValue::from(text.as_str()),
            };
            JceValue::Struct(JceStruct::new().with(1, address).with(2, *port))
        })
        .collect::<Vec<_>>();

    let body = JceStruct::new().with(SERVER_LIST_TAG, list);
    let envelope = encode_wrapper(
        &[(RESPONSE_NAME, &body)],
        &WrapperMeta::new(SERVICE_NAME, RESPONSE_NAME),
    );
    key.encrypt(&with_length_prefix(&envelope))
}

fn with_length_prefix(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    buf.put_u32((LENGTH_PREFIX + payload.len()) as u32);
    buf.put_slice(payload);
    buf.freeze()
}

fn parse_entry(value: &JceValue) -> Result<ServerEntry, DirectoryError> {
    match value {
        JceValue::Struct(fields) => entry_from_fields(fields),
        JceValue::Bytes(raw) => {
            let fields = decode_struct(raw)?;
            match fields.get(0) {
                Some(JceValue::Struct(inner)) if fields.get(1).is_none() => {
                    entry_from_fields(inner)
                }
                _ => entry_from_fields(&fields),
            }
        }
        _ => Err(DirectoryError::Malformed("server entry is not a struct")),
    }
}

fn entry_from_fields(fields: &JceStruct) -> Result<ServerEntry, DirectoryError> {
    let address = match fields.get(1) {
        Some(JceValue::Int(raw)) => IpField::Packed(packed_from_wire(*raw)?),
        Some(JceValue::String(text)) => IpField::Dotted(text.clone()),
        _ => return Err(DirectoryError::Malformed("server entry address missing")),
    };

    let port = match fields.get(2) {
        Some(JceValue::Int(raw)) => port_from_wire(*raw)?,
        _ => return Err(DirectoryError::Malformed("server entry port missing")),
    };

    Ok(ServerEntry::new(address, port))
}

// Addresses arrive as either a signed or an unsigned 32-bit integer
fn packed_from_wire(raw: i64) -> Result<u32, DirectoryError> {
    if let Ok(packed) = u32::try_from(raw) {
        return Ok(packed);
    }
    i32::try_from(raw)
        .map(|packed| packed as u32)
        .map_err(|_| DirectoryError::Malformed("server entry address out of range"))
}

// Ports above 32767 arrive as negative 16-bit integers
fn port_from_wire(raw: i64) -> Result<u16, DirectoryError> {
    if let Ok(port) = u16::try_from(raw) {
        return Ok(port);
    }
    i16::try_from(raw)
        .map(|port| port as u16)
        .map_err(|_| DirectoryError::Malformed("server entry port out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;
    use msf_wire::encode_struct;

    const KEY: TeaKey = TeaKey::new(*b"0123456789abcdef");

    fn identity() -> ClientIdentity {
        ClientIdentity {
            uin: 10001,
            sub_app_id: 537064989,
            imei: "866819027236657".to_string(),
        }
    }

    #[test]
    fn test_request_fields() {
        let fields = request_struct(&identity());

        assert!(fields.get(0).is_none());
        assert_eq!(fields.get(1).and_then(JceValue::as_i64), Some(10001));
        assert_eq!(fields.get(2).and_then(JceValue::as_i64), Some(0));
        assert_eq!(fields.get(3).and_then(JceValue::as_i64), Some(1));
        assert_eq!(fields.get(4).and_then(JceValue::as_str), Some("00000"));
        assert_eq!(fields.get(5).and_then(JceValue::as_i64), Some(100));
        assert_eq!(fields.get(6).and_then(JceValue::as_i64), Some(537064989));
        assert_eq!(
            fields.get(7).and_then(JceValue::as_str),
            Some("866819027236657")
        );
        for tag in 8..14 {
            assert_eq!(fields.get(tag).and_then(JceValue::as_i64), Some(0), "tag {tag}");
        }
        assert_eq!(fields.get(14).and_then(JceValue::as_i64), Some(1));
        assert_eq!(fields.len(), 14);
    }

    #[test]
    fn test_request_length_prefix() {
        let mut plain = encode_request(&identity());
        let declared = plain.get_u32() as usize;

        assert_eq!(declared, plain.len() + LENGTH_PREFIX);
        assert_eq!(decode_wrapper(&plain).unwrap(), request_struct(&identity()));
    }

    #[test]
    fn test_request_bytes() {
        let expected = hex::decode(concat!(
            "0000007a",                             // length, prefix included
            "1003", "2c", "3c", "4c",               // version 3, packet/message type, request id
            "560a436f6e66696748747470",             // "ConfigHttp"
            "661148747470536572766572",
            "4c697374526571",                       // "HttpServerListReq"
            "7d000049",                             // buffer, 73 bytes
            "080001",                               // one entry map
            "061148747470536572766572",
            "4c697374526571",
            "1d00002f",                             // request, 47 bytes
            "0a",                                   // struct begin
            "112711",                               // uin 10001
            "2c", "3001",
            "46053030303030",                       // "00000"
            "5064",                                 // 100
            "622002f61d",                           // sub app id
            "760f383636383139303237323336363537",   // imei
            "8c9cacbcccdc",                         // tags 8 to 13
            "e001",
            "0b",                                   // struct end
            "8c", "980c", "a80c",                   // timeout, context, status
        ))
        .unwrap();

        assert_eq!(encode_request(&identity()).as_ref(), expected.as_slice());
    }

    #[test]
    fn test_request_is_encrypted() {
        let cipher = encrypt_request(&identity(), &KEY);
        let plain = KEY.decrypt(&cipher).unwrap();

        assert_eq!(&plain[..], &encode_request(&identity())[..]);
    }

    #[test]
    fn test_parse_response_in_order() {
        let body = encrypt_response(
            &[
                (IpField::Packed(0x0100007F), 8080),
                (IpField::from("10.0.0.2"), 443),
            ],
            &KEY,
        );

        let entries = parse_response(&body, &KEY).unwrap();
        assert_eq!(
            entries,
            vec![
                ServerEntry::new("127.0.0.1", 8080),
                ServerEntry::new("10.0.0.2", 443),
            ]
        );
    }

    #[test]
    fn test_parse_empty_list() {
        let body = encrypt_response(&[], &KEY);
        assert!(parse_response(&body, &KEY).unwrap().is_empty());
    }

    #[test]
    fn test_entries_as_encoded_bytes() {
        let entry = JceStruct::new().with(1, 0x0201A8C0u32).with(2, 80u16);
        let wrapped = JceStruct::new().with(0, entry.clone());
        let list = vec![
            JceValue::Bytes(encode_struct(&entry)),
            JceValue::Bytes(encode_struct(&wrapped)),
        ];
        let body = JceStruct::new().with(SERVER_LIST_TAG, list);
        let envelope = encode_wrapper(
            &[(RESPONSE_NAME, &body)],
            &WrapperMeta::new(SERVICE_NAME, RESPONSE_NAME),
        );
        let cipher = KEY.encrypt(&with_length_prefix(&envelope));

        let entries = parse_response(&cipher, &KEY).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.address == "192.168.1.2" && e.port == 80));
    }

    #[test]
    fn test_high_port_wraps() {
        assert_eq!(port_from_wire(8080).unwrap(), 8080);
        assert_eq!(port_from_wire(-1).unwrap(), 65535);
        assert_eq!(port_from_wire(-25536).unwrap(), 40000);
        assert!(port_from_wire(70000).is_err());
    }

    #[test]
    fn test_address_ranges() {
        assert_eq!(packed_from_wire(0xFFFF_FFFF).unwrap(), u32::MAX);
        assert_eq!(packed_from_wire(-1).unwrap(), u32::MAX);
        assert_eq!(packed_from_wire(0x0100007F).unwrap(), 0x0100007F);
        assert!(packed_from_wire(1 << 32).is_err());
        assert!(packed_from_wire(i64::from(i32::MIN) - 1).is_err());

        let oversized = JceStruct::new().with(1, 1i64 << 40).with(2, 80u16);
        assert!(matches!(
            parse_entry(&JceValue::Struct(oversized)),
            Err(DirectoryError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_key() {
        let body = encrypt_response(&[(IpField::Packed(1), 80)], &KEY);
        let other = TeaKey::new([7u8; 16]);

        assert!(matches!(
            parse_response(&body, &other),
            Err(DirectoryError::Cipher(_))
        ));
    }

    #[test]
    fn test_missing_server_list() {
        let body = JceStruct::new().with(1, 5);
        let envelope = encode_wrapper(
            &[(RESPONSE_NAME, &body)],
            &WrapperMeta::new(SERVICE_NAME, RESPONSE_NAME),
        );
        let cipher = KEY.encrypt(&with_length_prefix(&envelope));

        assert!(matches!(
            parse_response(&cipher, &KEY),
            Err(DirectoryError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_envelope() {
        let cipher = KEY.encrypt(&with_length_prefix(&[0xFF, 0xFF, 0xFF]));

        assert!(matches!(
            parse_response(&cipher, &KEY),
            Err(DirectoryError::Decode(_))
        ));
    }
}
