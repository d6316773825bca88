// RouterOS API framing
//
// A word is a length prefix followed by that many bytes; a sentence is a
// run of words closed by a zero-length word. The prefix uses a variable
// width scheme where the high bits of the first byte select 1 to 5 bytes.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Upper bound for a single inbound word. Anything larger is treated as a
/// desynchronized stream rather than a legitimate reply.
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

// ── Sentence ─────────────────────────────────────────────────────────

/// An ordered list of words exchanged as one unit on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<String>,
}

impl Sentence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, word: impl Into<String>) {
        self.words.push(word.into());
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn into_words(self) -> Vec<String> {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<Vec<String>> for Sentence {
    fn from(words: Vec<String>) -> Self {
        Self { words }
    }
}

// ── Length prefix ────────────────────────────────────────────────────

/// Append the length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, dst: &mut BytesMut) -> Result<(), Error> {
    let n = u32::try_from(len).map_err(|_| Error::WordTooLong { len })?;
    match n {
        0..=0x7F => dst.put_u8(n.to_be_bytes()[3]),
        0x80..=0x3FFF => dst.put_slice(&(n | 0x8000).to_be_bytes()[2..]),
        0x4000..=0x1F_FFFF => dst.put_slice(&(n | 0xC0_0000).to_be_bytes()[1..]),
        0x20_0000..=0x0FFF_FFFF => dst.put_u32(n | 0xE000_0000),
        _ => {
            dst.put_u8(0xF0);
            dst.put_u32(n);
        }
    }
    Ok(())
}

/// Decode a length prefix from the front of `buf`.
///
/// Returns `(word_len, prefix_len)`, or `None` when more bytes are needed.
pub fn decode_length(buf: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    let prefix_len = match first {
        b if b & 0x80 == 0x00 => 1,
        b if b & 0xC0 == 0x80 => 2,
        b if b & 0xE0 == 0xC0 => 3,
        b if b & 0xF0 == 0xE0 => 4,
        0xF0 => 5,
        other => {
            return Err(Error::Protocol(format!(
                "reserved control byte 0x{other:02x} in length prefix"
            )));
        }
    };

    if buf.len() < prefix_len {
        return Ok(None);
    }

    let len = match prefix_len {
        1 => u32::from(first),
        2 => u32::from_be_bytes([0, 0, first & 0x3F, buf[1]]),
        3 => u32::from_be_bytes([0, first & 0x1F, buf[1], buf[2]]),
        4 => u32::from_be_bytes([first & 0x0F, buf[1], buf[2], buf[3]]),
        _ => u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
    };

    let len = usize::try_from(len)
        .map_err(|_| Error::Protocol(format!("word length {len} exceeds platform limits")))?;
    Ok(Some((len, prefix_len)))
}

// ── Codec ────────────────────────────────────────────────────────────

/// `tokio_util` codec turning a byte stream into [`Sentence`]s and back.
///
/// Words of a sentence that is still incomplete are kept in the codec so
/// that the read buffer never has to hold more than one word at a time.
#[derive(Debug, Default)]
pub struct ApiCodec {
    partial: Vec<String>,
}

impl Decoder for ApiCodec {
    type Item = Sentence;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Sentence>, Error> {
        loop {
            let Some((len, prefix_len)) = decode_length(src)? else {
                return Ok(None);
            };
            if len > MAX_WORD_LEN {
                return Err(Error::WordTooLong { len });
            }

            let needed = prefix_len + len;
            if src.len() < needed {
                src.reserve(needed - src.len());
                return Ok(None);
            }

            src.advance(prefix_len);
            let word = src.split_to(len);

            if len == 0 {
                return Ok(Some(Sentence::from(std::mem::take(&mut self.partial))));
            }
            self.partial
                .push(String::from_utf8_lossy(&word).into_owned());
        }
    }
}

impl Encoder<Sentence> for ApiCodec {
    type Error = Error;

    fn encode(&mut self, item: Sentence, dst: &mut BytesMut) -> Result<(), Error> {
        for word in item.words() {
            encode_length(word.len(), dst)?;
            dst.put_slice(word.as_bytes());
        }
        dst.put_u8(0);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(len: usize) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_length(len, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn length_prefix_widths_at_boundaries() {
        assert_eq!(prefix(0), vec![0x00]);
        assert_eq!(prefix(0x7F), vec![0x7F]);
        assert_eq!(prefix(0x80), vec![0x80, 0x80]);
        assert_eq!(prefix(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(prefix(0x4000), vec![0xC0, 0x40, 0x00]);
        assert_eq!(prefix(0x1F_FFFF), vec![0xDF, 0xFF, 0xFF]);
        assert_eq!(prefix(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
        assert_eq!(prefix(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_length_reads_each_width() {
        for len in [5, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, 0x1000_0000] {
            let encoded = prefix(len);
            let (decoded, width) = decode_length(&encoded).unwrap().unwrap();
            assert_eq!(decoded, len);
            assert_eq!(width, encoded.len());
        }
    }

    #[test]
    fn decode_length_waits_for_full_prefix() {
        assert!(decode_length(&[]).unwrap().is_none());
        assert!(decode_length(&[0xC0, 0x40]).unwrap().is_none());
    }

    #[test]
    fn decode_length_rejects_reserved_control_bytes() {
        assert!(matches!(decode_length(&[0xF8]), Err(Error::Protocol(_))));
    }

    #[test]
    fn decoder_assembles_sentence_across_partial_reads() {
        let mut codec = ApiCodec::default();
        let mut out = BytesMut::new();
        let sentence = Sentence::from(vec!["!re".to_owned(), "=name=ether1".to_owned()]);
        codec.encode(sentence.clone(), &mut out).unwrap();

        let mut src = BytesMut::new();
        let bytes = out.to_vec();
        let (head, tail) = bytes.split_at(6);

        src.extend_from_slice(head);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(tail);
        assert_eq!(codec.decode(&mut src).unwrap(), Some(sentence));
        assert!(src.is_empty());
    }

    #[test]
    fn decoder_yields_back_to_back_sentences() {
        let mut codec = ApiCodec::default();
        let mut src = BytesMut::new();
        codec
            .encode(Sentence::from(vec!["!re".to_owned()]), &mut src)
            .unwrap();
        codec
            .encode(Sentence::from(vec!["!done".to_owned()]), &mut src)
            .unwrap();

        let first = codec.decode(&mut src).unwrap().unwrap();
        let second = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(first.words(), ["!re"]);
        assert_eq!(second.words(), ["!done"]);
    }

    #[test]
    fn long_word_uses_two_byte_prefix() {
        let word = "x".repeat(200);
        let mut codec = ApiCodec::default();
        let mut dst = BytesMut::new();
        codec
            .encode(Sentence::from(vec![word.clone()]), &mut dst)
            .unwrap();

        assert_eq!(&dst[..2], &[0x80, 0xC8]);
        assert_eq!(dst.len(), 2 + 200 + 1);
        let decoded = codec.decode(&mut dst).unwrap().unwrap();
        assert_eq!(decoded.words(), [word]);
    }
}
