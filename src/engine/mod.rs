//! Engine Module
//!
//! The translation engine that coordinates all components.
//!
//! ## Responsibilities
//! - Turn client commands into cache reads, backend requests and fan-outs
//! - Pair responses with requests through per-server FIFOs
//! - Keep the cache tier in step with the backend (read-through,
//!   write-through, invalidation)
//! - Resend idempotent reads across replicas within the resend budget
//! - Emit each client's replies in command order
//!
//! ## I/O Model
//!
//! The engine performs no I/O. The event loop feeds it events
//! (`on_client_data`, `on_cache_data`, `on_backend_data`, close and timeout
//! notifications) and sends whatever [`Engine::drain_outbound`] returns.
//! Everything here is owned by one worker thread; the bucket TTL policy is
//! the only state shared with another thread, and it arrives as snapshots.

mod client;
mod pending;

pub use client::{ClientId, ClientQueue, ReplySlot};
pub use pending::{
    FragmentContext, OpId, PendingOperation, ReadIntent, SetRead, Stage, Target, WriteIntent,
};

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace, warn};

use crate::buffer::MessageBuffer;
use crate::config::PoolConfig;
use crate::error::{ProxyError, Result};
use crate::failover::{FailoverRouter, ServerId, ServerPool, Tier};
use crate::fragment::{Accumulator, Completed, Contribution, FragmentCoordinator, GroupId};
use crate::frontend::{parse_frontend_message, reply, Command, RespValue, SetAlgebra};
use crate::policy::PolicyReceiver;
use crate::translate::{self, GetOutcome, RequestTranslator, RoutedKey, SetQuery};
use crate::wire::{self, BackendRequest, BackendResponse, RequestBody, SetAction, HEADER_SIZE};

/// Something the event loop must do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write a reply to a client
    Reply { client: ClientId, data: Bytes },
    /// Write a command to a cache server
    Cache { server: ServerId, data: Bytes },
    /// Write a frame to a backend server
    Backend { server: ServerId, data: Bytes },
    /// Tear down a desynchronised cache connection
    CloseCache { server: ServerId },
    /// Tear down a desynchronised or timed-out backend connection
    CloseBackend { server: ServerId },
}

/// Request outstanding on a cache connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheEntry {
    Op(OpId),
    /// Side effect whose reply is dropped
    Swallowed,
}

#[derive(Debug, Default)]
struct CacheConn {
    inbound: MessageBuffer,
    pending: VecDeque<CacheEntry>,
}

#[derive(Debug, Default)]
struct BackendConn {
    inbound: MessageBuffer,
    pending: VecDeque<(OpId, wire::RequestKind)>,
}

/// The protocol state machine of one worker
pub struct Engine {
    /// Backend request builder (owns the pool configuration)
    translator: RequestTranslator,

    router: FailoverRouter,

    /// Ring and eject state, shared with the event loop
    pool: Arc<dyn ServerPool>,

    /// Bucket TTL snapshots from the policy poller
    policy: PolicyReceiver,

    /// Sibling tie-break randomness
    rng: StdRng,

    /// Vclocks by canonical key; `None` when disabled
    vclocks: Option<LruCache<Bytes, Bytes>>,

    ops: HashMap<OpId, PendingOperation>,
    next_op: u64,

    clients: HashMap<ClientId, ClientQueue>,
    cache_conns: HashMap<ServerId, CacheConn>,
    backend_conns: HashMap<ServerId, BackendConn>,

    fragments: FragmentCoordinator<FragmentContext>,

    outbox: Vec<Outbound>,
}

impl Engine {
    pub fn new(config: PoolConfig, pool: Arc<dyn ServerPool>, policy: PolicyReceiver) -> Self {
        let router = FailoverRouter::new(config.effective_max_resend());
        let vclocks = NonZeroUsize::new(config.vclock_cache_capacity).map(LruCache::new);
        debug!(
            "engine for pool {} (max_resend {}, vclock cache {})",
            config.name,
            router.max_resend(),
            config.vclock_cache_capacity
        );

        Self {
            translator: RequestTranslator::new(config),
            router,
            pool,
            policy,
            rng: StdRng::from_entropy(),
            vclocks,
            ops: HashMap::new(),
            next_op: 1,
            clients: HashMap::new(),
            cache_conns: HashMap::new(),
            backend_conns: HashMap::new(),
            fragments: FragmentCoordinator::new(),
            outbox: Vec::new(),
        }
    }

    /// Seed the sibling tie-break, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Take everything queued for the event loop
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // Client Events
    // =========================================================================

    /// Feed raw bytes read from a client
    pub fn on_client_data(&mut self, client: ClientId, data: &[u8]) {
        self.clients.entry(client).or_default().inbound.append(data);

        loop {
            let parsed = match self.clients.get_mut(&client) {
                Some(queue) => match parse_frontend_message(queue.inbound.as_slice()) {
                    Ok(Some((value, used))) => {
                        queue.inbound.consume(used);
                        Ok(value)
                    }
                    Ok(None) => return,
                    Err(e) => {
                        queue.inbound.clear();
                        Err(e)
                    }
                },
                None => return,
            };

            match parsed.and_then(Command::from_resp) {
                Ok(command) => self.on_client_command(client, command),
                Err(e) => self.reject(client, e),
            }
        }
    }

    /// Handle one parsed client command
    pub fn on_client_command(&mut self, client: ClientId, command: Command) {
        if self.policy.refresh() {
            debug!("bucket policy refreshed");
        }

        let slot = self.clients.entry(client).or_default().reserve();
        trace!("{} {} -> slot {:?}", client, command.name(), slot);

        if let Err(e) = self.dispatch(client, slot, command) {
            debug!("{} command rejected: {}", client, e);
            self.reply(client, slot, e.to_reply());
        }
    }

    /// Forget a client; its outstanding work is abandoned
    pub fn on_client_closed(&mut self, client: ClientId) {
        self.clients.remove(&client);

        let before = self.ops.len();
        self.ops.retain(|_, op| op.client != client);
        let groups = self.fragments.abandon_client(client);
        debug!(
            "{} closed: abandoned {} operations and {} fragment groups",
            client,
            before - self.ops.len(),
            groups
        );
    }

    fn reject(&mut self, client: ClientId, err: ProxyError) {
        let slot = self.clients.entry(client).or_default().reserve();
        self.reply(client, slot, err.to_reply());
    }

    fn reply(&mut self, client: ClientId, slot: ReplySlot, data: Bytes) {
        let Some(queue) = self.clients.get_mut(&client) else {
            trace!("dropping reply for closed {}", client);
            return;
        };
        if !queue.fill(slot, data) {
            warn!("{} slot {:?} already answered", client, slot);
            return;
        }
        for data in queue.drain_ready() {
            self.outbox.push(Outbound::Reply { client, data });
        }
    }

    // =========================================================================
    // Command Dispatch
    // =========================================================================

    fn dispatch(&mut self, client: ClientId, slot: ReplySlot, command: Command) -> Result<()> {
        let target = Target::Client(slot);

        match command {
            Command::Get { key } => {
                let key = RoutedKey::parse(&key)?;
                self.start_read(client, target, ReadIntent::Value { key });
            }
            Command::Set { key, value } => self.start_set(client, target, &key, value)?,
            Command::Del { keys } => self.start_del(client, slot, &keys)?,
            Command::SAdd { key, members } => {
                self.start_set_update(client, target, &key, SetAction::Add, members)?
            }
            Command::SRem { key, members } => {
                self.start_set_update(client, target, &key, SetAction::Remove, members)?
            }
            Command::SMembers { key } => self.start_set_query(client, target, &key, SetQuery::Members)?,
            Command::SIsMember { key, member } => {
                self.start_set_query(client, target, &key, SetQuery::IsMember(member))?
            }
            Command::SCard { key } => self.start_set_query(client, target, &key, SetQuery::Card)?,
            Command::SetOp { op, dest, keys } => self.start_algebra(client, slot, op, dest, &keys)?,
            Command::Incr { key, amount } => {
                let key = RoutedKey::parse(&key)?;
                let request = self.translator.counter_update(&key.key, amount)?;
                let op = PendingOperation::new(
                    client,
                    target,
                    Stage::BackendWrite(WriteIntent::Counter { key: key.clone() }),
                );
                let id = self.next_op_id();
                self.send_backend(id, op, &request, &key.raw);
            }
        }

        Ok(())
    }

    fn start_set(&mut self, client: ClientId, target: Target, raw: &Bytes, value: Bytes) -> Result<()> {
        let key = RoutedKey::parse(raw)?;
        let canonical = key.key.join();
        let known = self
            .vclocks
            .as_mut()
            .and_then(|cache| cache.get(&canonical).cloned());
        let id = self.next_op_id();

        match known {
            Some(vclock) => {
                debug!("SET {}: vclock known, writing directly", String::from_utf8_lossy(&canonical));
                let request = self.translator.put(&key.key, value.clone(), Some(vclock))?;
                let op = PendingOperation::new(
                    client,
                    target,
                    Stage::BackendWrite(WriteIntent::Put { key: key.clone(), value }),
                );
                self.send_backend(id, op, &request, &key.raw);
            }
            None => {
                debug!("SET {}: read-before-write", String::from_utf8_lossy(&canonical));
                let deferred = self.translator.put(&key.key, value.clone(), None)?;
                let request = self.translator.get(&key.key)?;
                let route = key.raw.clone();
                let op = PendingOperation::new(
                    client,
                    target,
                    Stage::AwaitingVclock {
                        key,
                        value,
                        deferred,
                    },
                );
                self.send_backend(id, op, &request, &route);
            }
        }
        Ok(())
    }

    fn start_del(&mut self, client: ClientId, slot: ReplySlot, keys: &[Bytes]) -> Result<()> {
        let plan = translate::plan_del(keys)?;

        for key in &plan.local {
            self.send_cache_side_effect(&key.raw, translate::invalidate(&key.raw));
        }

        let group = self.fragments.open(
            client,
            plan.backend.len(),
            Accumulator::count(plan.local.len() as i64),
            FragmentContext::Del { slot },
        );

        for (index, key) in plan.backend.into_iter().enumerate() {
            let target = Target::Fragment { group, slot: index };
            match self.translator.delete(&key.key) {
                Ok(request) => {
                    let route = key.raw.clone();
                    let op = PendingOperation::new(
                        client,
                        target,
                        Stage::BackendWrite(WriteIntent::Delete { key }),
                    );
                    let id = self.next_op_id();
                    self.send_backend(id, op, &request, &route);
                }
                Err(e) => {
                    warn!("DEL fragment {} not sent: {}", index, e);
                    self.contribute(group, Contribution::Failed);
                }
            }
        }

        if let Some(done) = self.fragments.poll(group) {
            self.complete_group(done);
        }
        Ok(())
    }

    fn start_set_update(
        &mut self,
        client: ClientId,
        target: Target,
        raw: &Bytes,
        action: SetAction,
        members: Vec<Bytes>,
    ) -> Result<()> {
        let key = RoutedKey::parse(raw)?;
        let count = members.len();
        let request = self.translator.set_update(&key.key, action, members)?;
        let route = key.raw.clone();
        let op = PendingOperation::new(
            client,
            target,
            Stage::BackendWrite(WriteIntent::SetUpdate { key, count }),
        );
        let id = self.next_op_id();
        self.send_backend(id, op, &request, &route);
        Ok(())
    }

    fn start_set_query(&mut self, client: ClientId, target: Target, raw: &Bytes, query: SetQuery) -> Result<()> {
        let key = RoutedKey::parse(raw)?;
        self.start_read(
            client,
            target,
            ReadIntent::Set {
                key,
                read: SetRead::Query(query),
            },
        );
        Ok(())
    }

    fn start_algebra(
        &mut self,
        client: ClientId,
        slot: ReplySlot,
        op: SetAlgebra,
        dest: Option<Bytes>,
        keys: &[Bytes],
    ) -> Result<()> {
        let keys = keys.iter().map(RoutedKey::parse).collect::<Result<Vec<_>>>()?;
        let dest = match dest {
            Some(raw) => {
                let dest = RoutedKey::parse(&raw)?;
                dest.key.clone().require_bucket()?;
                Some(dest)
            }
            None => None,
        };

        debug!("{} over {} keys", op.name(), keys.len());
        let group = self.fragments.open(
            client,
            keys.len(),
            Accumulator::sets(keys.len()),
            FragmentContext::Algebra { slot, op, dest },
        );

        for (index, key) in keys.into_iter().enumerate() {
            self.start_read(
                client,
                Target::Fragment { group, slot: index },
                ReadIntent::Set {
                    key,
                    read: SetRead::Slot,
                },
            );
        }
        Ok(())
    }

    // =========================================================================
    // Sending
    // =========================================================================

    fn next_op_id(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }

    /// Look a key up in the cache tier first
    fn start_read(&mut self, client: ClientId, target: Target, intent: ReadIntent) {
        let id = self.next_op_id();
        let raw = intent.key().raw.clone();
        let command = match &intent {
            ReadIntent::Value { .. } => reply::cache_get(&raw),
            ReadIntent::Set {
                read: SetRead::Query(SetQuery::IsMember(member)),
                ..
            } => reply::cache_sismember(&raw, member),
            ReadIntent::Set {
                read: SetRead::Query(SetQuery::Card),
                ..
            } => reply::cache_scard(&raw),
            ReadIntent::Set { .. } => reply::cache_smembers(&raw),
        };
        let op = PendingOperation::new(client, target, Stage::CacheRead(intent));

        match self.pool.pick_server(Tier::Cache, &raw) {
            Some(server) => {
                self.cache_conns
                    .entry(server)
                    .or_default()
                    .pending
                    .push_back(CacheEntry::Op(id));
                self.outbox.push(Outbound::Cache {
                    server,
                    data: command,
                });
                self.ops.insert(id, op);
            }
            None => {
                trace!("no cache server for {:?}, treating as miss", id);
                self.cache_miss(id, op);
            }
        }
    }

    /// Write into the cache tier without a client waiting on the reply
    fn send_cache_side_effect(&mut self, route: &[u8], data: Bytes) {
        match self.pool.pick_server(Tier::Cache, route) {
            Some(server) => {
                self.cache_conns
                    .entry(server)
                    .or_default()
                    .pending
                    .push_back(CacheEntry::Swallowed);
                self.outbox.push(Outbound::Cache { server, data });
            }
            None => trace!("no cache server, side effect dropped"),
        }
    }

    /// Encode and send a backend request to the primary replica of `route`
    fn send_backend(&mut self, id: OpId, mut op: PendingOperation, request: &BackendRequest, route: &[u8]) {
        let frame = match self.translator.encode(request) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{:?} not sent: {}", request.kind(), e);
                return self.fail(op, e.to_reply());
            }
        };
        let Some(server) = self.router.primary(self.pool.as_ref(), route) else {
            let err = ProxyError::Upstream("no backend server available".to_string());
            return self.fail(op, err.to_reply());
        };

        op.kind = Some(request.kind());
        op.frame = Some(frame);
        op.primary = Some(server);
        self.dispatch_backend(id, op, server);
    }

    /// Queue the op's frame on `server`
    fn dispatch_backend(&mut self, id: OpId, op: PendingOperation, server: ServerId) {
        let (Some(kind), Some(frame)) = (op.kind, op.frame.clone()) else {
            let err = ProxyError::Protocol("operation has no encoded request".to_string());
            return self.fail(op, err.to_reply());
        };
        self.backend_conns
            .entry(server)
            .or_default()
            .pending
            .push_back((id, kind));
        self.outbox.push(Outbound::Backend {
            server,
            data: frame,
        });
        self.ops.insert(id, op);
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Deliver a successful client reply
    fn finish(&mut self, op: PendingOperation, data: Bytes) {
        match op.target {
            Target::Client(slot) => self.reply(op.client, slot, data),
            Target::Fragment { group, .. } => {
                warn!("client reply produced for a fragment of {:?}", group);
                self.contribute(group, Contribution::Failed);
            }
        }
    }

    /// Fail an operation: an error reply, or a failed fragment
    fn fail(&mut self, op: PendingOperation, data: Bytes) {
        match op.target {
            Target::Client(slot) => self.reply(op.client, slot, data),
            Target::Fragment { group, .. } => self.contribute(group, Contribution::Failed),
        }
    }

    fn contribute(&mut self, group: GroupId, contribution: Contribution) {
        if let Some(done) = self.fragments.contribute(group, contribution) {
            self.complete_group(done);
        }
    }

    fn complete_group(&mut self, done: Completed<FragmentContext>) {
        let client = done.client;
        match done.context {
            FragmentContext::Del { slot } => {
                let count = done.accumulator.as_count().unwrap_or(0);
                self.reply(client, slot, reply::integer(count));
            }
            FragmentContext::Algebra { slot, op, dest } => {
                if done.failures > 0 {
                    let message = format!(
                        "{}: {} source sets could not be fetched",
                        op.name(),
                        done.failures
                    );
                    return self.reply(client, slot, reply::error(&message));
                }

                let result = translate::set_algebra(op, &done.accumulator.into_sets());
                match dest {
                    None => self.reply(client, slot, reply::members(&result)),
                    Some(dest) => self.start_store(client, slot, dest, result),
                }
            }
        }
    }

    /// STORE replaces `dest`: fetch what it holds now, then diff against the result
    fn start_store(
        &mut self,
        client: ClientId,
        slot: ReplySlot,
        dest: RoutedKey,
        members: Vec<Bytes>,
    ) {
        match self.translator.set_fetch(&dest.key) {
            Ok(request) => {
                let route = dest.raw.clone();
                let op = PendingOperation::new(
                    client,
                    Target::Client(slot),
                    Stage::StoreFetch { dest, members },
                );
                let id = self.next_op_id();
                self.send_backend(id, op, &request, &route);
            }
            Err(e) => self.reply(client, slot, e.to_reply()),
        }
    }

    /// Cache copy of a stored set, then the cardinality reply
    fn finish_store(&mut self, op: PendingOperation, dest: RoutedKey, members: Vec<Bytes>) {
        let ttl = self.ttl_for(&dest);
        for command in translate::replace_set(&dest.raw, &members, ttl) {
            self.send_cache_side_effect(&dest.raw, command);
        }
        self.finish(op, reply::integer(members.len() as i64));
    }

    fn ttl_for(&self, key: &RoutedKey) -> Option<u64> {
        self.policy
            .current()
            .resolve_ttl(&key.key, self.translator.config().server_ttl_ms)
    }

    fn remember_vclock(&mut self, key: &RoutedKey, vclock: Option<Bytes>) {
        if let (Some(cache), Some(vclock)) = (self.vclocks.as_mut(), vclock) {
            if !vclock.is_empty() {
                cache.put(key.key.join(), vclock);
            }
        }
    }

    // =========================================================================
    // Cache Events
    // =========================================================================

    /// Feed raw bytes read from a cache server
    pub fn on_cache_data(&mut self, server: ServerId, data: &[u8]) {
        self.cache_conns.entry(server).or_default().inbound.append(data);

        loop {
            let parsed = match self.cache_conns.get_mut(&server) {
                Some(conn) => match parse_frontend_message(conn.inbound.as_slice()) {
                    Ok(Some((value, used))) => {
                        conn.inbound.consume(used);
                        Ok((value, conn.pending.pop_front()))
                    }
                    Ok(None) => return,
                    Err(e) => Err(e),
                },
                None => return,
            };

            match parsed {
                Ok((value, Some(CacheEntry::Op(id)))) => match self.ops.remove(&id) {
                    Some(op) => self.on_cache_reply(id, op, value),
                    None => trace!("discarding cache reply for abandoned {:?}", id),
                },
                Ok((value, Some(CacheEntry::Swallowed))) => {
                    if let RespValue::Error(message) = &value {
                        warn!(
                            "cache server {} rejected side effect: {}",
                            server,
                            String::from_utf8_lossy(message)
                        );
                    }
                }
                Ok((_, None)) => {
                    let err = ProxyError::Protocol("cache reply with no request outstanding".to_string());
                    return self.cache_failure(server, Some(err));
                }
                Err(e) => return self.cache_failure(server, Some(e)),
            }
        }
    }

    /// A cache connection went away; its pending reads become misses
    pub fn on_cache_closed(&mut self, server: ServerId) {
        self.cache_failure(server, None);
    }

    fn cache_failure(&mut self, server: ServerId, err: Option<ProxyError>) {
        if let Some(err) = &err {
            warn!("cache server {} desynchronised: {}", server, err);
            self.outbox.push(Outbound::CloseCache { server });
        }
        let Some(conn) = self.cache_conns.remove(&server) else {
            return;
        };

        let mut dropped = 0;
        for entry in conn.pending {
            match entry {
                CacheEntry::Op(id) => {
                    if let Some(op) = self.ops.remove(&id) {
                        self.cache_miss(id, op);
                    }
                }
                CacheEntry::Swallowed => dropped += 1,
            }
        }
        debug!("cache server {} lost, {} side effects dropped", server, dropped);
    }

    fn on_cache_reply(&mut self, id: OpId, op: PendingOperation, value: RespValue) {
        let intent = match &op.stage {
            Stage::CacheRead(intent) => intent.clone(),
            other => {
                warn!("cache reply for {:?} in stage {}", id, other.name());
                let err = ProxyError::Protocol("unexpected cache reply".to_string());
                return self.fail(op, err.to_reply());
            }
        };

        if let RespValue::Error(message) = &value {
            warn!(
                "cache lookup for {:?} failed: {}",
                id,
                String::from_utf8_lossy(message)
            );
            return self.cache_miss(id, op);
        }

        match intent {
            ReadIntent::Value { .. } if value.is_nil() => self.cache_miss(id, op),
            ReadIntent::Value { .. } => self.finish(op, value.encode()),
            ReadIntent::Set {
                read: SetRead::Query(query),
                ..
            } => {
                if translate::is_set_cache_miss(&query, &value) {
                    self.cache_miss(id, op);
                } else {
                    self.finish(op, value.encode());
                }
            }
            ReadIntent::Set {
                read: SetRead::Slot, ..
            } => match (translate::cached_members(&value), op.target) {
                (Some(members), Target::Fragment { group, slot }) => {
                    self.contribute(group, Contribution::Set { slot, members })
                }
                _ => self.cache_miss(id, op),
            },
        }
    }

    /// Read-through: go to the backend, or answer empty for cache-only keys
    fn cache_miss(&mut self, id: OpId, mut op: PendingOperation) {
        let intent = match &op.stage {
            Stage::CacheRead(intent) => intent.clone(),
            other => {
                warn!("cache miss for {:?} in stage {}", id, other.name());
                let err = ProxyError::Protocol("unexpected cache miss".to_string());
                return self.fail(op, err.to_reply());
            }
        };

        if !intent.key().has_bucket() {
            return match (&intent, op.target) {
                (ReadIntent::Value { .. }, _) => self.finish(op, reply::nil()),
                (ReadIntent::Set { read: SetRead::Query(query), .. }, _) => {
                    self.finish(op, translate::set_query_reply(query, &[]))
                }
                (ReadIntent::Set { .. }, Target::Fragment { group, slot }) => {
                    self.contribute(group, Contribution::Set { slot, members: Vec::new() })
                }
                (ReadIntent::Set { .. }, Target::Client(_)) => self.finish(op, reply::members(&[])),
            };
        }

        let key = intent.key().clone();
        debug!("read-through for {}", String::from_utf8_lossy(&key.raw));
        let request = match &intent {
            ReadIntent::Value { .. } => self.translator.get(&key.key),
            ReadIntent::Set { .. } => self.translator.set_fetch(&key.key),
        };

        op.stage = Stage::BackendRead(intent);
        match request {
            Ok(request) => self.send_backend(id, op, &request, &key.raw),
            Err(e) => self.fail(op, e.to_reply()),
        }
    }

    // =========================================================================
    // Backend Events
    // =========================================================================

    /// Feed raw bytes read from a backend server
    pub fn on_backend_data(&mut self, server: ServerId, data: &[u8]) {
        self.backend_conns.entry(server).or_default().inbound.append(data);

        loop {
            let next = match self.backend_conns.get_mut(&server) {
                Some(conn) => match wire::decode_frame(conn.inbound.as_slice()) {
                    Ok(Some(frame)) => {
                        let code = frame.code;
                        let len = frame.wire_len();
                        let raw = conn.inbound.extract(len);
                        Ok((code, raw.slice(HEADER_SIZE..), conn.pending.pop_front()))
                    }
                    Ok(None) => return,
                    Err(e) => Err(e),
                },
                None => return,
            };

            let (code, payload, pending) = match next {
                Ok(next) => next,
                Err(e) => return self.backend_failure(server, e),
            };
            let Some((id, kind)) = pending else {
                let err = ProxyError::Protocol(format!(
                    "response code {} with no request outstanding",
                    code
                ));
                return self.backend_failure(server, err);
            };
            trace!("backend {} frame: code {} len {}", server, code, payload.len());

            match wire::decode_response(code, &payload, kind) {
                Ok(response) => match self.ops.remove(&id) {
                    Some(op) => self.on_backend_response(id, op, server, response),
                    None => trace!("discarding backend response for abandoned {:?}", id),
                },
                Err(e) => {
                    if let Some(op) = self.ops.remove(&id) {
                        let err = ProxyError::Upstream(format!("undecodable response: {}", e));
                        self.fail(op, err.to_reply());
                    }
                    if e.is_fatal_to_connection() {
                        return self.backend_failure(server, e);
                    }
                }
            }
        }
    }

    /// A backend connection closed; its reads may be resent
    pub fn on_backend_closed(&mut self, server: ServerId) {
        self.backend_transient(server, "connection closed");
    }

    /// The event loop timed out a backend server
    pub fn on_backend_timeout(&mut self, server: ServerId) {
        self.outbox.push(Outbound::CloseBackend { server });
        self.backend_transient(server, "request timed out");
    }

    /// Desync: close the connection and fail everything on it
    fn backend_failure(&mut self, server: ServerId, err: ProxyError) {
        warn!("backend server {} desynchronised: {}", server, err);
        self.outbox.push(Outbound::CloseBackend { server });

        let Some(conn) = self.backend_conns.remove(&server) else {
            return;
        };
        for (id, _) in conn.pending {
            if let Some(op) = self.ops.remove(&id) {
                let upstream = ProxyError::Upstream(format!("backend connection reset: {}", err));
                self.fail(op, upstream.to_reply());
            }
        }
    }

    fn backend_transient(&mut self, server: ServerId, reason: &str) {
        let Some(conn) = self.backend_conns.remove(&server) else {
            return;
        };
        debug!(
            "backend server {} {}: {} requests outstanding",
            server,
            reason,
            conn.pending.len()
        );
        for (id, _) in conn.pending {
            if let Some(op) = self.ops.remove(&id) {
                self.retry_or_fail(id, op, server, reason);
            }
        }
    }

    fn retry_or_fail(&mut self, id: OpId, mut op: PendingOperation, failed: ServerId, reason: &str) {
        if op.is_resendable() {
            let primary = op.primary.unwrap_or(failed);
            match self.router.next_replica(self.pool.as_ref(), primary, &mut op.resend) {
                Some(next) => {
                    debug!("resending {:?} to {} after {} {}", id, next, failed, reason);
                    return self.dispatch_backend(id, op, next);
                }
                None => warn!("{:?}: resend budget exhausted", id),
            }
        }
        let err = ProxyError::Upstream(format!("backend {} {}", failed, reason));
        self.fail(op, err.to_reply());
    }

    /// Resend a not-found read to the next replica, if the budget allows
    ///
    /// Hands the operation back when it was not resent.
    fn resend_not_found(&mut self, id: OpId, mut op: PendingOperation) -> Option<PendingOperation> {
        if !op.is_resendable() {
            return Some(op);
        }
        let Some(primary) = op.primary else {
            return Some(op);
        };
        match self.router.next_replica(self.pool.as_ref(), primary, &mut op.resend) {
            Some(next) => {
                debug!("{:?} not found, re-reading from {}", id, next);
                self.dispatch_backend(id, op, next);
                None
            }
            None => Some(op),
        }
    }

    fn on_backend_response(&mut self, id: OpId, op: PendingOperation, server: ServerId, response: BackendResponse) {
        if let BackendResponse::Error { message, code } = &response {
            warn!("backend {} error {}: {}", server, code, message);
            if translate::classify_backend_error(message).is_retryable() && op.is_resendable() {
                return self.retry_or_fail(id, op, server, message);
            }
            let data = translate::backend_error_reply(&response).unwrap_or_else(|| reply::error(message));
            return self.fail(op, data);
        }

        match op.stage.clone() {
            Stage::BackendRead(ReadIntent::Value { key }) => self.on_value_read(id, op, key, response),
            Stage::BackendRead(ReadIntent::Set { key, read }) => {
                self.on_set_read(id, op, key, read, response)
            }
            Stage::AwaitingVclock {
                key,
                value,
                deferred,
            } => self.on_vclock_read(id, op, key, value, deferred, response),
            Stage::StoreFetch { dest, members } => self.on_store_fetch(id, op, dest, members, response),
            Stage::BackendWrite(intent) => self.on_write_ack(op, intent, response),
            Stage::CacheRead(_) => {
                let err = ProxyError::Protocol("backend response for a cache read".to_string());
                self.fail(op, err.to_reply());
            }
        }
    }

    fn on_value_read(&mut self, id: OpId, op: PendingOperation, key: RoutedKey, response: BackendResponse) {
        let Some(outcome) = translate::get_outcome(&response, &mut self.rng) else {
            return self.fail(op, reply::error("unexpected response to a get"));
        };

        match outcome {
            GetOutcome::Found { value, vclock } => {
                self.remember_vclock(&key, vclock);
                let ttl = self.ttl_for(&key);
                self.send_cache_side_effect(&key.raw, translate::populate_value(&key.raw, &value, ttl));
                self.finish(op, reply::bulk(&value));
            }
            GetOutcome::NotFound { vclock } => {
                self.remember_vclock(&key, vclock);
                if let Some(op) = self.resend_not_found(id, op) {
                    self.finish(op, reply::nil());
                }
            }
        }
    }

    fn on_set_read(
        &mut self,
        id: OpId,
        op: PendingOperation,
        key: RoutedKey,
        read: SetRead,
        response: BackendResponse,
    ) {
        let not_found = response.is_not_found();
        let BackendResponse::SetFetchResult { members, .. } = response else {
            return self.fail(op, reply::error("unexpected response to a set fetch"));
        };

        let op = if not_found && matches!(read, SetRead::Query(_)) {
            match self.resend_not_found(id, op) {
                Some(op) => op,
                None => return,
            }
        } else {
            op
        };

        let ttl = self.ttl_for(&key);
        for command in translate::populate_set(&key.raw, &members, ttl) {
            self.send_cache_side_effect(&key.raw, command);
        }

        match (read, op.target) {
            (SetRead::Query(query), _) => self.finish(op, translate::set_query_reply(&query, &members)),
            (SetRead::Slot, Target::Fragment { group, slot }) => {
                self.contribute(group, Contribution::Set { slot, members })
            }
            (SetRead::Slot, Target::Client(_)) => self.finish(op, reply::members(&members)),
        }
    }

    fn on_vclock_read(
        &mut self,
        id: OpId,
        op: PendingOperation,
        key: RoutedKey,
        value: Bytes,
        mut deferred: BackendRequest,
        response: BackendResponse,
    ) {
        let BackendResponse::GetResult { vclock, .. } = response else {
            return self.fail(op, reply::error("unexpected response to a vclock fetch"));
        };
        self.remember_vclock(&key, vclock.clone());

        if let RequestBody::Put { vclock: slot, .. } = &mut deferred.body {
            *slot = vclock.filter(|v| !v.is_empty());
        }
        debug!(
            "vclock fetched for {}, sending deferred put",
            String::from_utf8_lossy(&key.raw)
        );

        let route = key.raw.clone();
        let write = PendingOperation::new(
            op.client,
            op.target,
            Stage::BackendWrite(WriteIntent::Put { key, value }),
        );
        self.send_backend(id, write, &deferred, &route);
    }

    fn on_store_fetch(
        &mut self,
        id: OpId,
        op: PendingOperation,
        dest: RoutedKey,
        members: Vec<Bytes>,
        response: BackendResponse,
    ) {
        let BackendResponse::SetFetchResult {
            members: current,
            context,
        } = response
        else {
            return self.fail(op, reply::error("unexpected response to a set fetch"));
        };

        match self.translator.set_replace(&dest.key, &current, context, &members) {
            Ok(Some(request)) => {
                debug!(
                    "STORE {}: {} members held, {} wanted",
                    String::from_utf8_lossy(&dest.raw),
                    current.len(),
                    members.len()
                );
                let route = dest.raw.clone();
                let write = PendingOperation::new(
                    op.client,
                    op.target,
                    Stage::BackendWrite(WriteIntent::Store { dest, members }),
                );
                self.send_backend(id, write, &request, &route);
            }
            Ok(None) => self.finish_store(op, dest, members),
            Err(e) => self.fail(op, e.to_reply()),
        }
    }

    fn on_write_ack(&mut self, op: PendingOperation, intent: WriteIntent, response: BackendResponse) {
        match (intent, response) {
            (WriteIntent::Put { key, value }, BackendResponse::PutAck { vclock }) => {
                self.remember_vclock(&key, vclock);
                let ttl = self.ttl_for(&key);
                self.send_cache_side_effect(&key.raw, translate::populate_value(&key.raw, &value, ttl));
                self.finish(op, reply::ok());
            }
            (WriteIntent::SetUpdate { key, count }, BackendResponse::UpdateAck) => {
                self.send_cache_side_effect(&key.raw, translate::invalidate(&key.raw));
                self.finish(op, reply::integer(count as i64));
            }
            (WriteIntent::Counter { key }, BackendResponse::CounterValue(value)) => {
                self.send_cache_side_effect(&key.raw, translate::invalidate(&key.raw));
                self.finish(op, reply::integer(value));
            }
            (WriteIntent::Delete { key }, BackendResponse::DeleteAck) => {
                self.send_cache_side_effect(&key.raw, translate::invalidate(&key.raw));
                match op.target {
                    Target::Fragment { group, .. } => self.contribute(group, Contribution::Count(1)),
                    Target::Client(_) => self.finish(op, reply::integer(1)),
                }
            }
            (WriteIntent::Store { dest, members }, BackendResponse::UpdateAck) => {
                self.finish_store(op, dest, members)
            }
            (intent, other) => {
                warn!("unexpected {:?} for write to {:?}", other, intent.key().raw);
                self.fail(op, reply::error("unexpected backend response"));
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &PoolConfig {
        self.translator.config()
    }

    /// Operations still waiting on a server
    pub fn pending_operations(&self) -> usize {
        self.ops.len()
    }

    /// Fragment groups not yet complete
    pub fn open_fragment_groups(&self) -> usize {
        self.fragments.len()
    }

    /// Replies a client is still owed
    pub fn outstanding_replies(&self, client: ClientId) -> usize {
        self.clients.get(&client).map_or(0, ClientQueue::outstanding)
    }

    /// Requests awaiting a response on a backend server
    pub fn backend_in_flight(&self, server: ServerId) -> usize {
        self.backend_conns.get(&server).map_or(0, |c| c.pending.len())
    }

    /// Vclock remembered for a canonical key
    pub fn cached_vclock(&self, canonical: &[u8]) -> Option<Bytes> {
        self.vclocks.as_ref()?.peek(canonical).cloned()
    }
}
