use crate::cache::{
    BlockCache, CachedResponse, Caches, QuestionLogEntry, QuestionSink, ResponseCache,
};
use crate::config::SharedConfig;
use crate::dns::resolver::{DynUpstream, Transport};
use crate::error::Error;
use crate::question::{AddressFamily, Question};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use trust_dns_proto::op::{Header, Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{RData, Record};
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::server::{Protocol, Request, RequestHandler, ResponseHandler, ResponseInfo};

/// The query pipeline: cache check, block check, upstream resolution, cache population.
///
/// Holds no per-query state; every query runs [`Handler::resolve`] independently against the
/// shared caches.
#[derive(Clone)]
pub struct Handler {
    config: SharedConfig,
    upstream: DynUpstream,
    cache: Arc<ResponseCache>,
    neg_cache: Arc<ResponseCache>,
    block_cache: Arc<BlockCache>,
    questions: QuestionSink,
}

impl Handler {
    #[must_use]
    pub fn new(
        config: SharedConfig,
        upstream: DynUpstream,
        caches: &Caches,
        questions: QuestionSink,
    ) -> Self {
        Handler {
            config,
            upstream,
            cache: Arc::clone(&caches.positive),
            neg_cache: Arc::clone(&caches.negative),
            block_cache: Arc::clone(&caches.blocked),
            questions,
        }
    }

    /// Produces the response for `request`. Never fails: internal errors become a SERVFAIL
    /// carrying the request's id and question.
    ///
    /// Only the first question is looked at. Address-record queries (`IN` `A`/`AAAA`) go through
    /// the positive cache, the negative cache and the block cache before reaching the upstream;
    /// everything else is forwarded untouched and never cached.
    pub async fn resolve(&self, request: &Message, transport: Transport, remote: IpAddr) -> Message {
        let Some(query) = request.queries().first() else {
            return failure(request, ResponseCode::FormErr);
        };
        let question = Question::from(query);
        let key = question.key();
        let family = AddressFamily::of(query.query_type(), query.query_class());
        debug!("{remote} lookup {question}");

        if let Some(family) = family {
            if let Some(response) = self.cached(request, &question, &key) {
                return response;
            }
            if self.block_cache.exists(&question.name) {
                debug!("{} found in blocklist", question.name);
                let response = self.blocked_response(request, query, family);
                self.questions
                    .record(QuestionLogEntry::now(remote, question.clone(), true));
                if let Err(err) = self.cache.set(
                    &key,
                    CachedResponse::Answer(response.clone()),
                    self.config.block_expire(),
                ) {
                    error!("set {question} block cache failed: {err}");
                }
                return response;
            }
        }

        self.questions
            .record(QuestionLogEntry::now(remote, question.clone(), false));

        match self.upstream.lookup(transport, request).await {
            Err(err) => {
                warn!("resolve {question} failed: {err}");
                if family.is_some() {
                    if let Err(err) =
                        self.neg_cache
                            .set(&key, CachedResponse::Failed, self.neg_cache.ttl())
                    {
                        error!("set {question} negative cache failed: {err}");
                    }
                }
                failure(request, ResponseCode::ServFail)
            }
            Ok(mut response) => {
                response.set_id(request.id());
                if family.is_some() {
                    match self.positive_ttl(&response) {
                        Some(ttl) => match self.cache.set(
                            &key,
                            CachedResponse::Answer(response.clone()),
                            ttl,
                        ) {
                            Ok(()) => debug!("insert {question} into cache for {ttl:?}"),
                            Err(err) => error!("set {question} cache failed: {err}"),
                        },
                        None => debug!("{question} answer not cacheable"),
                    }
                }
                response
            }
        }
    }

    fn cached(&self, request: &Message, question: &Question, key: &str) -> Option<Message> {
        if let Some(CachedResponse::Answer(mut response)) = self.cache.get(key) {
            debug!("{question} hit cache");
            // The cache handed out its own copy; the stored template keeps its id.
            response.set_id(request.id());
            return Some(response);
        }
        if self.neg_cache.get(key).is_some() {
            debug!("{question} hit negative cache");
            return Some(failure(request, ResponseCode::ServFail));
        }
        debug!("{question} didn't hit cache");
        None
    }

    fn blocked_response(&self, request: &Message, query: &Query, family: AddressFamily) -> Message {
        let rdata = match family {
            AddressFamily::V4 => RData::A(self.config.nullroute),
            AddressFamily::V6 => RData::AAAA(self.config.nullroute_v6),
        };
        let mut response = reply_to(request);
        response
            .set_recursion_available(true)
            .set_response_code(ResponseCode::NoError)
            .add_answer(Record::from_rdata(
                query.name().clone(),
                self.config.ttl,
                rdata,
            ));
        response
    }

    /// Lifetime of an upstream answer in the positive cache: the configured expiry, shortened to
    /// the smallest answer TTL. `None` when there are no answers or any of them has a zero TTL.
    fn positive_ttl(&self, response: &Message) -> Option<Duration> {
        let expire = self.cache.ttl();
        response
            .answers()
            .iter()
            .map(Record::ttl)
            .min()
            .filter(|&ttl| ttl > 0)
            .map(|ttl| expire.min(Duration::from_secs(u64::from(ttl))))
    }

    /// Copies what upstream needs from an inbound request into a plain message.
    fn forwardable(request: &Request) -> Message {
        let header = request.header();
        let mut message = Message::new();
        message
            .set_id(header.id())
            .set_message_type(MessageType::Query)
            .set_op_code(header.op_code())
            .set_recursion_desired(header.recursion_desired())
            .set_checking_disabled(header.checking_disabled())
            .set_authentic_data(header.authentic_data())
            .add_query(request.query().original().clone());
        if let Some(edns) = request.edns() {
            message.set_edns(edns.clone());
        }
        message
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self.handle_notimpl(request, response).await;
        }

        let transport = match request.protocol() {
            Protocol::Udp => Transport::Udp,
            _ => Transport::Tcp,
        };
        let message = self
            .resolve(&Self::forwardable(request), transport, request.src().ip())
            .await;
        self.send_message(request, response, &message).await
    }

    async fn handle_notimpl<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), ResponseCode::NotImp))
            .await?)
    }

    async fn send_message<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        message: &Message,
    ) -> Result<ResponseInfo, Error> {
        let mut header = Header::response_from_request(request.header());
        header.set_response_code(message.response_code());
        header.set_authoritative(message.authoritative());
        header.set_recursion_available(message.recursion_available());
        header.set_authentic_data(message.authentic_data());
        let mut builder = MessageResponseBuilder::from_message_request(request);
        if let Some(edns) = message.extensions() {
            builder.edns(edns.clone());
        }
        let response = builder.build(
            header,
            message.answers().iter(),
            message.name_servers().iter(),
            &[],
            message.additionals().iter(),
        );
        Ok(response_handle.send_response(response).await?)
    }
}

/// A response skeleton for `request`: same id, opcode, recursion-desired flag and question.
fn reply_to(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .add_queries(request.queries().to_vec());
    response
}

fn failure(request: &Message, code: ResponseCode) -> Message {
    let mut response = reply_to(request);
    response.set_recursion_available(true).set_response_code(code);
    response
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                // Typically a client that went away before its answer was written.
                debug!("error answering {}: {:?}", request.src(), error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
