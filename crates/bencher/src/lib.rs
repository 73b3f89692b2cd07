//! Shared fixtures of the micro-mllp benchmarks.

const START_BLOCK: u8 = 0x0b;
const END_BLOCK: [u8; 2] = [0x1c, 0x0d];

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    message: TestMessage,
}

impl TestCase {
    pub const fn new(name: &'static str, message: TestMessage) -> Self {
        Self { name, message }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> &TestMessage {
        &self.message
    }
}

/// An HL7 message loaded from `resources/message`.
#[derive(Debug, Copy, Clone)]
pub struct TestMessage {
    file_name: &'static str,
    text: &'static str,
}

impl TestMessage {
    pub const fn new(file_name: &'static str, text: &'static str) -> Self {
        Self { file_name, text }
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// The message wrapped in a single MLLP frame.
    pub fn framed(&self) -> Vec<u8> {
        self.framed_times(1)
    }

    /// `count` frames of the message back to back, the way a busy sender pipelines them.
    pub fn framed_times(&self, count: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.text.len() + 3) * count);
        for _ in 0..count {
            bytes.push(START_BLOCK);
            bytes.extend_from_slice(self.text.as_bytes());
            bytes.extend_from_slice(&END_BLOCK);
        }
        bytes
    }
}

pub static ADT_SMALL: TestMessage = TestMessage::new("adt_small.hl7", include_str!("../resources/message/adt_small.hl7"));
pub static ORU_LARGE: TestMessage = TestMessage::new("oru_large.hl7", include_str!("../resources/message/oru_large.hl7"));

pub fn test_cases() -> Vec<TestCase> {
    vec![TestCase::new("adt_small", ADT_SMALL), TestCase::new("oru_large", ORU_LARGE)]
}
