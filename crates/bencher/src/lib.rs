#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    payload: Payload,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, payload: Payload) -> Self {
        Self { name, group, payload }
    }

    pub fn small(name: &'static str, payload: Payload) -> Self {
        Self::new(name, TestGroup::Small, payload)
    }

    pub fn large(name: &'static str, payload: Payload) -> Self {
        Self::new(name, TestGroup::Large, payload)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// A response body used as benchmark input.
#[derive(Debug, Copy, Clone)]
pub struct Payload {
    content_type: &'static str,
    content: &'static str,
}

impl Payload {
    pub const fn new(content_type: &'static str, content: &'static str) -> Self {
        Self { content_type, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Large,
}
