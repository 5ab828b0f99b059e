//! Byte interceptors.
//!
//! Interceptors sit between the codec and the driver and rewrite raw
//! instance bytes. On save they run in registration order; on load
//! they run in reverse, so each interceptor undoes its own transform
//! regardless of how many are stacked.

use std::sync::Arc;

/// A reversible byte transform applied to instance payloads.
pub trait ByteInterceptor: Send + Sync {
    /// Transforms outbound bytes before the driver stores them.
    fn encode(&self, bytes: &[u8]) -> Vec<u8>;

    /// Reverses [`encode`](ByteInterceptor::encode) on inbound bytes.
    fn decode(&self, bytes: &[u8]) -> Vec<u8>;
}

/// Runs the chain forward over outbound bytes.
#[must_use]
pub fn apply_encode(chain: &[Arc<dyn ByteInterceptor>], bytes: Vec<u8>) -> Vec<u8> {
    chain.iter().fold(bytes, |b, i| i.encode(&b))
}

/// Runs the chain in reverse over inbound bytes.
#[must_use]
pub fn apply_decode(chain: &[Arc<dyn ByteInterceptor>], bytes: Vec<u8>) -> Vec<u8> {
    chain.iter().rev().fold(bytes, |b, i| i.decode(&b))
}

/// XOR-mask interceptor. Self-inverse; mainly useful for exercising
/// the chain in tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct XorInterceptor {
    mask: u8,
}

impl XorInterceptor {
    /// Creates an interceptor with the given mask.
    #[must_use]
    pub fn new(mask: u8) -> Self {
        XorInterceptor { mask }
    }
}

impl ByteInterceptor for XorInterceptor {
    fn encode(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|b| b ^ self.mask).collect()
    }

    fn decode(&self, bytes: &[u8]) -> Vec<u8> {
        self.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Prepends a marker byte, so ordering mistakes corrupt output.
    struct Framed(u8);

    impl ByteInterceptor for Framed {
        fn encode(&self, bytes: &[u8]) -> Vec<u8> {
            let mut out = vec![self.0];
            out.extend_from_slice(bytes);
            out
        }

        fn decode(&self, bytes: &[u8]) -> Vec<u8> {
            assert_eq!(bytes.first(), Some(&self.0), "chain order violated");
            bytes[1..].to_vec()
        }
    }

    #[test]
    fn chain_applies_in_order_and_reverses() {
        let chain: Vec<Arc<dyn ByteInterceptor>> =
            vec![Arc::new(Framed(0xAA)), Arc::new(Framed(0xBB))];
        let encoded = apply_encode(&chain, vec![1, 2, 3]);
        // Outermost transform is the last-registered one.
        assert_eq!(encoded, vec![0xBB, 0xAA, 1, 2, 3]);
        assert_eq!(apply_decode(&chain, encoded), vec![1, 2, 3]);
    }

    #[test]
    fn xor_is_self_inverse() {
        let x = XorInterceptor::new(0x5C);
        let data = vec![0u8, 1, 255, 42];
        assert_eq!(x.decode(&x.encode(&data)), data);
        assert_ne!(x.encode(&data), data);
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain: Vec<Arc<dyn ByteInterceptor>> = Vec::new();
        assert_eq!(apply_encode(&chain, vec![9]), vec![9]);
        assert_eq!(apply_decode(&chain, vec![9]), vec![9]);
    }
}
