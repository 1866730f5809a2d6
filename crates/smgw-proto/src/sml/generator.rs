//! Stateful SML request generator.
//!
//! Builds the request side of an SML envelope: `public_open`, a payload
//! message per queued command, `public_close`, then [`RequestGenerator::boxing`]
//! to frame everything accumulated so far. Transaction ids are
//! `<root>-<counter>` with a monotonically increasing counter, so every
//! message of a session carries a unique, correlatable id.

use bytes::Bytes;
use chrono::Utc;

use super::framing;
use super::message::{
    CloseRequest, GetListRequest, GetProcParameterRequest, GetProfileListRequest, OpenRequest,
    SetProcParameterRequest, SmlBody, SmlMessage,
};
use super::tree::SmlTree;
use super::value::SmlValue;
use crate::obis::ObisPath;

/// Render the current UTC time as an SML request file id (`YYYYMMDDhhmmss`).
#[must_use]
pub fn gen_file_id() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Generator for the request side of one gateway dialogue.
#[derive(Debug)]
pub struct RequestGenerator {
    name: String,
    pwd: String,
    trx_root: String,
    counter: u64,
    group_no: u8,
    messages: Vec<Bytes>,
}

impl RequestGenerator {
    /// New generator bound to one account.
    ///
    /// The transaction root is derived from the construction time, so
    /// parallel generators produce disjoint id spaces.
    #[must_use]
    pub fn new(name: impl Into<String>, pwd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pwd: pwd.into(),
            trx_root: Utc::now().timestamp().to_string(),
            counter: 1,
            group_no: 0,
            messages: Vec::new(),
        }
    }

    /// Account name the generator signs requests with.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.name
    }

    /// Next transaction id: `<root>-<counter>`, post-incrementing.
    pub fn next_trx(&mut self) -> String {
        let trx = format!("{}-{}", self.trx_root, self.counter);
        self.counter += 1;
        trx
    }

    /// Number of messages accumulated since the last boxing.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.messages.len()
    }

    fn append(&mut self, trx: &str, body: SmlBody) {
        let group_no = match body {
            // Close requests always travel in group 0
            SmlBody::CloseRequest(_) => 0,
            _ => {
                let g = self.group_no;
                self.group_no = self.group_no.wrapping_add(1);
                g
            },
        };
        let msg = SmlMessage::new(Bytes::copy_from_slice(trx.as_bytes()), group_no, 0, body);
        self.messages.push(msg.encode());
    }

    /// Open an envelope with a public open request.
    pub fn public_open(&mut self, client_id: Option<Bytes>, server_id: Option<Bytes>) -> String {
        debug_assert!(self.messages.is_empty(), "pending SML data");
        let trx = self.next_trx();
        let body = SmlBody::OpenRequest(OpenRequest {
            codepage: None,
            client_id,
            file_id: Bytes::from(gen_file_id().into_bytes()),
            server_id,
            name: Some(self.name.clone()),
            pwd: Some(self.pwd.clone()),
            version: None,
        });
        self.append(&trx, body);
        trx
    }

    /// Close the envelope with a public close request.
    pub fn public_close(&mut self) -> String {
        let trx = self.next_trx();
        self.append(&trx, SmlBody::CloseRequest(CloseRequest::default()));
        trx
    }

    /// Queue a get-proc-parameter request.
    pub fn get_proc_parameter(&mut self, server_id: &[u8], path: &ObisPath) -> String {
        let trx = self.next_trx();
        let body = SmlBody::GetProcParameterRequest(GetProcParameterRequest {
            server_id: Bytes::copy_from_slice(server_id),
            name: self.name.clone(),
            pwd: self.pwd.clone(),
            path: path.codes().to_vec(),
            attribute: None,
        });
        self.append(&trx, body);
        trx
    }

    /// Queue a set-proc-parameter request installing `value` at the path
    /// leaf.
    pub fn set_proc_parameter(
        &mut self,
        server_id: &[u8],
        path: &ObisPath,
        value: SmlValue,
    ) -> String {
        let trx = self.next_trx();
        let leaf = path.codes()[path.len() - 1];
        let tree = match value {
            SmlValue::None => SmlTree::empty(leaf),
            value => SmlTree::leaf(leaf, value),
        };
        let body = SmlBody::SetProcParameterRequest(SetProcParameterRequest {
            server_id: Bytes::copy_from_slice(server_id),
            name: self.name.clone(),
            pwd: self.pwd.clone(),
            path: path.codes().to_vec(),
            tree,
        });
        self.append(&trx, body);
        trx
    }

    /// Queue a get-profile-list request over `[begin, end]`.
    pub fn get_profile_list(
        &mut self,
        server_id: &[u8],
        begin: u32,
        end: u32,
        path: &ObisPath,
    ) -> String {
        let trx = self.next_trx();
        let body = SmlBody::GetProfileListRequest(GetProfileListRequest {
            server_id: Bytes::copy_from_slice(server_id),
            name: self.name.clone(),
            pwd: self.pwd.clone(),
            with_raw: None,
            begin: Some(begin),
            end: Some(end),
            path: path.codes().to_vec(),
            object_list: Vec::new(),
            das_details: None,
        });
        self.append(&trx, body);
        trx
    }

    /// Queue a get-list request.
    pub fn get_list(
        &mut self,
        client_id: Option<Bytes>,
        server_id: &[u8],
        list_name: crate::obis::Obis,
    ) -> String {
        let trx = self.next_trx();
        let body = SmlBody::GetListRequest(GetListRequest {
            client_id,
            server_id: Bytes::copy_from_slice(server_id),
            name: self.name.clone(),
            pwd: self.pwd.clone(),
            list_name: Some(list_name),
        });
        self.append(&trx, body);
        trx
    }

    /// Frame all accumulated messages and clear the queue.
    pub fn boxing(&mut self) -> Bytes {
        let framed = framing::boxing(&self.messages);
        self.messages.clear();
        self.group_no = 0;
        framed
    }
}

#[cfg(test)]
mod tests {
    use super::super::message::SmlMessage;
    use super::super::parser::SmlParser;
    use super::*;
    use crate::obis::codes;

    #[test]
    fn trx_is_root_dash_counter() {
        let mut generator = RequestGenerator::new("operator", "operator");
        let first = generator.next_trx();
        let second = generator.next_trx();

        let (root_a, n_a) = first.rsplit_once('-').unwrap();
        let (root_b, n_b) = second.rsplit_once('-').unwrap();
        assert_eq!(root_a, root_b);
        assert!(n_b.parse::<u64>().unwrap() > n_a.parse::<u64>().unwrap());
    }

    #[test]
    fn trx_counter_is_monotonic_across_envelopes() {
        let mut generator = RequestGenerator::new("operator", "operator");
        let mut last = 0u64;
        for _ in 0..3 {
            generator.public_open(None, None);
            generator.get_proc_parameter(&[0x01], &ObisPath::root(codes::ROOT_DEVICE_IDENT));
            let close_trx = generator.public_close();
            let _ = generator.boxing();

            let n: u64 = close_trx.rsplit_once('-').unwrap().1.parse().unwrap();
            assert!(n > last);
            last = n;
        }
    }

    #[test]
    fn boxing_clears_the_queue() {
        let mut generator = RequestGenerator::new("operator", "operator");
        generator.public_open(None, None);
        generator.public_close();
        assert_eq!(generator.pending(), 2);
        let framed = generator.boxing();
        assert!(!framed.is_empty());
        assert_eq!(generator.pending(), 0);
    }

    #[test]
    fn envelope_parses_back_in_order() {
        let mut generator = RequestGenerator::new("operator", "operator");
        let open_trx = generator.public_open(None, None);
        let query_trx =
            generator.get_proc_parameter(&[0x02], &ObisPath::root(codes::ROOT_IPT_PARAM));
        let close_trx = generator.public_close();
        let framed = generator.boxing();

        let mut parser = SmlParser::new();
        parser.push(&framed);

        let msgs: Vec<SmlMessage> =
            std::iter::from_fn(|| parser.next()).map(|r| r.unwrap()).collect();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].trx_str(), Some(open_trx.as_str()));
        assert_eq!(msgs[1].trx_str(), Some(query_trx.as_str()));
        assert_eq!(msgs[2].trx_str(), Some(close_trx.as_str()));
    }
}
