//! The query subsystem: `qSupported` feature negotiation, thread listing,
//! and `qXfer:features:read` target-description paging.

use core::fmt::Debug;

use bitflags::bitflags;
use log::debug;

use crate::conn::ConnectionExt;
use crate::protocol::common::hex::decode_hex;
use crate::protocol::ResponseWriter;
use crate::protocol::MAX_PACKET_SIZE;
use crate::sim::EventQueue;
use crate::target::Target;

use super::dispatch::query_handler;
use super::dispatch::Context;
use super::error::CmdError;
use super::GdbStub;

bitflags! {
    /// Features the client offered in `qSupported`. Only the ones that
    /// change this stub's behavior are recorded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ProtocolFeatures: u8 {
        /// The client understands `swbreak:` stop-reason annotations.
        const SWBREAK = 1 << 0;
        /// The client understands `hwbreak:` stop-reason annotations.
        const HWBREAK = 1 << 1;
    }
}

/// Encode one page of a `qXfer:<object>:read` reply: prefix `m` when more
/// data remains past the requested window, `l` when this page (possibly
/// empty) ends the document. The slice itself travels binary-escaped.
pub(crate) fn encode_xfer_response(
    res: &mut ResponseWriter,
    doc: &[u8],
    offset: usize,
    length: usize,
) {
    if offset >= doc.len() {
        res.write(b'l');
        return;
    }
    let end = doc.len().min(offset.saturating_add(length));
    res.write(if end == doc.len() { b'l' } else { b'm' });
    res.write_binary(&doc[offset..end]);
}

impl<T, E, C> GdbStub<T, E, C>
where
    T: Target,
    E: EventQueue,
    C: ConnectionExt,
    C::Error: Debug,
{
    /// `q<name>[:<args>]` - route to the query table. Unknown queries get
    /// the empty reply.
    pub(crate) fn cmd_query(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let data = core::mem::take(&mut ctx.data);
        let pos = data
            .iter()
            .position(|b| matches!(*b, b':' | b',' | b';'))
            .unwrap_or(data.len());
        let (name, rest) = data.split_at_mut(pos);
        let rest = if rest.is_empty() { rest } else { &mut rest[1..] };

        match query_handler(&*name) {
            Some(handler) => {
                ctx.data = rest;
                handler(self, ctx)
            }
            None => {
                debug!("unsupported query {:?}", String::from_utf8_lossy(name));
                Ok(true)
            }
        }
    }

    /// `qSupported:<offers>` - record the client's offers, reply with
    /// ours.
    pub(crate) fn query_supported(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        self.features = ProtocolFeatures::empty();
        for offer in ctx.data.split(|b| *b == b';') {
            let (name, on) = match offer.last().copied() {
                Some(b'+') => (&offer[..offer.len() - 1], true),
                Some(b'-') => (&offer[..offer.len() - 1], false),
                // `name=value` offers (and noise) carry nothing we track
                _ => continue,
            };
            let flag = match name {
                b"swbreak" => ProtocolFeatures::SWBREAK,
                b"hwbreak" => ProtocolFeatures::HWBREAK,
                _ => continue,
            };
            self.features.set(flag, on);
        }
        debug!("client features: {:?}", self.features);

        ctx.reply.write_str("PacketSize=");
        ctx.reply.write_num(MAX_PACKET_SIZE);
        ctx.reply.write_str(";vContSupported+;swbreak+;hwbreak+");
        for feature in self.target.available_features() {
            ctx.reply.write(b';');
            ctx.reply.write_str(feature);
        }
        if self.target.xfer_features_read("target.xml").is_some() {
            ctx.reply.write_str(";qXfer:features:read+");
        }
        Ok(true)
    }

    /// `qXfer:features:read:<annex>:<offset>,<length>` - page through a
    /// target-description annex.
    pub(crate) fn query_xfer(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let rest = match ctx.data.strip_prefix(b"features:read:") {
            Some(rest) => rest,
            // other qXfer objects are not served
            None => return Ok(true),
        };

        let mut parts = rest.splitn(2, |b| *b == b':');
        let annex = parts.next().unwrap();
        let window = parts.next().ok_or(CmdError::BadRequest)?;
        let mut window = window.split(|b| *b == b',');
        let offset: usize = window
            .next()
            .and_then(|b| decode_hex(b).ok())
            .ok_or(CmdError::BadRequest)?;
        let length: usize = window
            .next()
            .and_then(|b| decode_hex(b).ok())
            .ok_or(CmdError::BadRequest)?;

        let annex = core::str::from_utf8(annex).map_err(|_| CmdError::BadRequest)?;
        let doc = self
            .target
            .xfer_features_read(annex)
            .ok_or(CmdError::BadAnnex)?;
        encode_xfer_response(&mut ctx.reply, doc.as_bytes(), offset, length);
        Ok(true)
    }

    /// `qC` - report the current thread.
    pub(crate) fn query_current_thread(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        ctx.reply.write_str("QC");
        ctx.reply.write_num(self.cur_id() + 1);
        Ok(true)
    }

    /// `qfThreadInfo` - restart thread listing and emit the first page.
    pub(crate) fn query_thread_info_first(
        &mut self,
        ctx: &mut Context<'_>,
    ) -> Result<bool, CmdError> {
        self.tinfo_pos = 0;
        self.thread_info_page(ctx)
    }

    /// `qsThreadInfo` - emit the next page, or `l` once exhausted.
    pub(crate) fn query_thread_info_next(
        &mut self,
        ctx: &mut Context<'_>,
    ) -> Result<bool, CmdError> {
        self.thread_info_page(ctx)
    }

    fn thread_info_page(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        let ids: Vec<_> = self.threads.keys().copied().collect();
        if self.tinfo_pos >= ids.len() {
            ctx.reply.write(b'l');
            return Ok(true);
        }

        ctx.reply.write(b'm');
        let mut first = true;
        while self.tinfo_pos < ids.len() && ctx.reply.len() < MAX_PACKET_SIZE - 32 {
            if !first {
                ctx.reply.write(b',');
            }
            first = false;
            ctx.reply.write_num(ids[self.tinfo_pos] + 1);
            self.tinfo_pos += 1;
        }
        Ok(true)
    }

    /// `qAttached` - this stub always attaches to an existing "process"
    /// (the simulated machine), so the answer is always `1`.
    pub(crate) fn query_attached(&mut self, ctx: &mut Context<'_>) -> Result<bool, CmdError> {
        ctx.reply.write_str("1");
        Ok(true)
    }
}
