//! Request/response netlink connection used for state dumps.

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgError, NlMsgHdr,
};
use super::parse::FromNetlink;
use super::socket::NetlinkSocket;

/// Netlink connection for issuing requests to the kernel.
///
/// Each dump runs on this dedicated socket so multicast traffic on the
/// event socket never interleaves with a multipart response.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a new request connection.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::route()?,
        })
    }

    /// Send a dump request and collect every message of the multipart
    /// response, in kernel order.
    pub async fn send_dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        self.socket.send(&builder.finish()).await?;

        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;
            let mut done = false;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    continue;
                }

                if header.is_done() {
                    done = true;
                    break;
                }

                // Keep the full message (header + payload)
                let msg_len = header.nlmsg_len as usize;
                let msg_start = payload.as_ptr() as usize
                    - data.as_ptr() as usize
                    - std::mem::size_of::<NlMsgHdr>();
                if msg_start + msg_len <= data.len() {
                    responses.push(data[msg_start..msg_start + msg_len].to_vec());
                }
            }

            if done {
                break;
            }
        }

        Ok(responses)
    }

    /// Issue a dump request and parse every response into a typed message.
    ///
    /// Messages that fail to decode are dropped individually; a transient
    /// decode failure never aborts the dump.
    pub async fn dump_typed<T: FromNetlink>(&self, msg_type: u16) -> Result<Vec<T>> {
        let mut builder = MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP);

        let mut header_buf = Vec::new();
        T::write_dump_header(&mut header_buf);
        builder.append_bytes(&header_buf);

        let responses = self.send_dump(builder).await?;

        let mut parsed = Vec::with_capacity(responses.len());
        for response in responses {
            if response.len() < NLMSG_HDRLEN {
                continue;
            }
            if let Ok(msg) = T::from_bytes(&response[NLMSG_HDRLEN..]) {
                parsed.push(msg);
            }
        }

        Ok(parsed)
    }
}
