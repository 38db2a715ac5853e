/// Response body with exactly one owner at a time: the scheme handler builds it, the response
/// takes it over, and the engine consumes it. It is deliberately not `Clone`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResourceBuffer {
    bytes: Vec<u8>,
}

impl ResourceBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn copy_from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for ResourceBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<String> for ResourceBuffer {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl From<&str> for ResourceBuffer {
    fn from(text: &str) -> Self {
        Self::copy_from(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceBuffer;

    #[test]
    fn owned_bodies_move_through_without_copying() {
        let body = String::from("<p>hi</p>");
        let pointer = body.as_ptr();

        let bytes = ResourceBuffer::from(body).into_vec();

        assert_eq!(bytes, b"<p>hi</p>".to_vec());
        assert_eq!(bytes.as_ptr(), pointer);
    }

    #[test]
    fn borrowed_bodies_are_copied() {
        let buffer = ResourceBuffer::from("abc");

        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.as_slice(), b"abc");
        assert!(ResourceBuffer::default().is_empty());
    }
}
