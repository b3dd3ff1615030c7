//! Wire framing: every [`Envelope`] is sent as a `u64` little-endian length
//! prefix followed by its SCALE-encoded bytes (spec.md §4.1).

use pbft_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pbft_types::error::SendError;
use pbft_types::message::Envelope;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected outright rather than allocating an
/// attacker-controlled buffer size.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub async fn write_envelope<W: AsyncWrite + Unpin>(
    w: &mut W,
    envelope: &Envelope,
) -> Result<usize, SendError> {
    let bytes = to_bytes_canonical(envelope);
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(SendError::TooLarge(bytes.len()));
    }
    w.write_all(&(bytes.len() as u64).to_le_bytes())
        .await
        .map_err(|_| SendError::ConnectionLost)?;
    w.write_all(&bytes)
        .await
        .map_err(|_| SendError::ConnectionLost)?;
    w.flush().await.map_err(|_| SendError::ConnectionLost)?;
    Ok(bytes.len())
}

pub async fn read_envelope<R: AsyncRead + Unpin>(r: &mut R) -> Result<Envelope, SendError> {
    let mut len_buf = [0u8; 8];
    r.read_exact(&mut len_buf)
        .await
        .map_err(|_| SendError::ConnectionLost)?;
    let len = u64::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(SendError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .await
        .map_err(|_| SendError::ConnectionLost)?;
    from_bytes_canonical(&buf).map_err(|_| SendError::Serialise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_types::message::{HashType, Signature};

    fn sample_envelope() -> Envelope {
        Envelope {
            payload: vec![1, 2, 3, 4],
            signature: Signature {
                signer_id: 1,
                sig_bytes: vec![9; 64],
                hash_type: HashType::Sha256,
            },
        }
    }

    #[tokio::test]
    async fn roundtrips_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let envelope = sample_envelope();
        write_envelope(&mut client, &envelope).await.expect("write");
        let got = read_envelope(&mut server).await.expect("read");
        assert_eq!(got, envelope);
    }

    #[tokio::test]
    async fn rejects_oversized_frame_length_prefix() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let huge_len = (MAX_FRAME_BYTES as u64 + 1).to_le_bytes();
        client.write_all(&huge_len).await.expect("write");
        let res = read_envelope(&mut server).await;
        assert!(matches!(res, Err(SendError::TooLarge(_))));
    }
}
