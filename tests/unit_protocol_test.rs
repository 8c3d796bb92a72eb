use bytes::{Bytes, BytesMut};
use kubalert::core::cache::protocol::{Frame, FrameCodec};
use tokio_util::codec::{Decoder, Encoder};

fn decode_one(bytes: &[u8]) -> Option<Frame> {
    let mut buf = BytesMut::from(bytes);
    FrameCodec.decode(&mut buf).unwrap()
}

#[tokio::test]
async fn test_decodes_simple_types() {
    assert_eq!(
        decode_one(b"+OK\r\n"),
        Some(Frame::SimpleString("OK".to_string()))
    );
    assert_eq!(decode_one(b":42\r\n"), Some(Frame::Integer(42)));
    assert_eq!(decode_one(b":-7\r\n"), Some(Frame::Integer(-7)));
    assert_eq!(decode_one(b"$-1\r\n"), Some(Frame::Null));
    assert_eq!(
        decode_one(b"$5\r\nhello\r\n"),
        Some(Frame::BulkString(Bytes::from_static(b"hello")))
    );
    assert_eq!(
        decode_one(b"-ERR unknown\r\n"),
        Some(Frame::Error("ERR unknown".to_string()))
    );
}

#[tokio::test]
async fn test_incomplete_frames_yield_none() {
    assert_eq!(decode_one(b"$5\r\nhel"), None);
    assert_eq!(decode_one(b"*2\r\n:1\r\n"), None);
    assert_eq!(decode_one(b":12"), None);
}

#[tokio::test]
async fn test_malformed_frames_error() {
    let mut buf = BytesMut::from(&b"?bogus\r\n"[..]);
    assert!(FrameCodec.decode(&mut buf).is_err());

    let mut buf = BytesMut::from(&b":notanumber\r\n"[..]);
    assert!(FrameCodec.decode(&mut buf).is_err());
}

#[tokio::test]
async fn test_decode_consumes_exactly_one_frame() {
    let mut buf = BytesMut::from(&b":1\r\n:2\r\n"[..]);
    assert_eq!(FrameCodec.decode(&mut buf).unwrap(), Some(Frame::Integer(1)));
    assert_eq!(FrameCodec.decode(&mut buf).unwrap(), Some(Frame::Integer(2)));
    assert_eq!(FrameCodec.decode(&mut buf).unwrap(), None);
}

#[tokio::test]
async fn test_command_round_trips() {
    let mut buf = BytesMut::new();
    FrameCodec
        .encode(Frame::command(&["INCRBY", "k", "1"]), &mut buf)
        .unwrap();
    let decoded = FrameCodec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(
        decoded,
        Frame::Array(vec![
            Frame::BulkString(Bytes::from_static(b"INCRBY")),
            Frame::BulkString(Bytes::from_static(b"k")),
            Frame::BulkString(Bytes::from_static(b"1")),
        ])
    );
    assert!(buf.is_empty());
}
