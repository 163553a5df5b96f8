//! Accumulates multi-part text lists such as file listings.

use hcom_protocol::Response;

/// Collects list members between a list header and the concluding response.
///
/// A header starts a fresh list. Members and CRC members append in arrival
/// order. The list completes on a `Concluded` response for the expected
/// request type, or on any `Concluded` once a header has been seen when no
/// request type was set.
#[derive(Debug, Default)]
pub struct TextListAccumulator {
    expected: Option<u16>,
    header: Option<String>,
    entries: Vec<String>,
    complete: bool,
}

impl TextListAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and wait for the list answering `request_type`.
    pub fn expect(&mut self, request_type: u16) {
        self.reset();
        self.expected = Some(request_type);
    }

    /// Drop any partial list.
    pub fn reset(&mut self) {
        self.expected = None;
        self.header = None;
        self.entries.clear();
        self.complete = false;
    }

    /// Feed a response. Returns true if the response belonged to the list.
    pub fn apply(&mut self, response: &Response) -> bool {
        match response {
            Response::TextListHeader(text) => {
                self.header = Some(text.clone());
                self.entries.clear();
                self.complete = false;
                true
            }
            Response::TextListMember(text) | Response::TextCrcMember(text) => {
                self.entries.push(text.clone());
                true
            }
            Response::TextConcluded { request_type } => {
                let ends_list = match self.expected {
                    Some(expected) => expected == *request_type,
                    None => self.header.is_some(),
                };
                if ends_list {
                    self.complete = true;
                }
                ends_list
            }
            _ => false,
        }
    }

    /// Whether the list has concluded.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Header text of the current list.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Members collected so far.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Take the collected members and reset.
    pub fn take_entries(&mut self) -> Vec<String> {
        let entries = std::mem::take(&mut self.entries);
        self.reset();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcom_protocol::{REQ_LIST_PARTITION_FILES, REQ_LIST_PARTITION_FILES_AND_CRC};

    fn listing() -> Vec<Response> {
        vec![
            Response::TextListHeader("files".to_string()),
            Response::TextListMember("a".to_string()),
            Response::TextListMember("b".to_string()),
            Response::TextCrcMember("c".to_string()),
            Response::TextConcluded {
                request_type: REQ_LIST_PARTITION_FILES,
            },
        ]
    }

    #[test]
    fn test_members_collected_in_order() {
        let mut acc = TextListAccumulator::new();
        for response in listing() {
            assert!(acc.apply(&response));
        }
        assert!(acc.is_complete());
        assert_eq!(acc.header(), Some("files"));
        assert_eq!(acc.take_entries(), vec!["a", "b", "c"]);
        assert!(!acc.is_complete());
    }

    #[test]
    fn test_expected_request_type_must_match() {
        let mut acc = TextListAccumulator::new();
        acc.expect(REQ_LIST_PARTITION_FILES_AND_CRC);
        for response in listing() {
            acc.apply(&response);
        }
        assert!(!acc.is_complete());

        acc.apply(&Response::TextConcluded {
            request_type: REQ_LIST_PARTITION_FILES_AND_CRC,
        });
        assert!(acc.is_complete());
        assert_eq!(acc.entries(), ["a", "b", "c"]);
    }

    #[test]
    fn test_stray_conclusion_does_not_complete() {
        let mut acc = TextListAccumulator::new();
        assert!(!acc.apply(&Response::TextConcluded { request_type: 0x0103 }));
        assert!(!acc.is_complete());
    }

    #[test]
    fn test_new_header_discards_partial_list() {
        let mut acc = TextListAccumulator::new();
        acc.apply(&Response::TextListHeader("one".to_string()));
        acc.apply(&Response::TextListMember("stale".to_string()));
        acc.apply(&Response::TextListHeader("two".to_string()));
        acc.apply(&Response::TextListMember("fresh".to_string()));
        assert_eq!(acc.entries(), ["fresh"]);
    }

    #[test]
    fn test_unrelated_responses_ignored() {
        let mut acc = TextListAccumulator::new();
        assert!(!acc.apply(&Response::TextStdout("hello".to_string())));
        assert!(acc.entries().is_empty());
    }
}
