use async_trait::async_trait;
use sinkhole::cache::{CachedResponse, QuestionLogEntry, QuestionSink};
use sinkhole::dns::resolver::{Transport, Upstream};
use sinkhole::dns::{server, Handler};
use sinkhole::error::Error;
use sinkhole::{Caches, Config};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

/// Answers every query with a single record, or fails every query.
struct CountingUpstream {
    calls: AtomicUsize,
    answer: Option<Ipv4Addr>,
    delay: Duration,
}

impl CountingUpstream {
    fn answering(ip: Ipv4Addr) -> Arc<Self> {
        Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            answer: Some(ip),
            delay: Duration::ZERO,
        })
    }

    fn slow(ip: Ipv4Addr, delay: Duration) -> Arc<Self> {
        Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            answer: Some(ip),
            delay,
        })
    }

    fn unreachable() -> Arc<Self> {
        Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            answer: None,
            delay: Duration::ZERO,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for CountingUpstream {
    async fn lookup(&self, _: Transport, request: &Message) -> Result<Message, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let Some(ip) = self.answer else {
            return Err(Error::UpstreamExhausted(2));
        };
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_recursion_available(true)
            .add_queries(request.queries().to_vec());
        if let Some(query) = request.queries().first() {
            if query.query_type() == RecordType::A {
                response.add_answer(Record::from_rdata(query.name().clone(), 300, RData::A(ip)));
            }
        }
        Ok(response)
    }
}

struct Pipeline {
    handler: Handler,
    caches: Caches,
    log: mpsc::Receiver<QuestionLogEntry>,
}

fn pipeline(upstream: Arc<CountingUpstream>, blocked: &[&str]) -> Pipeline {
    let config = Config {
        ttl: 60,
        nullroute: Ipv4Addr::new(10, 0, 0, 1),
        nullroute_v6: Ipv6Addr::LOCALHOST,
        ..Config::default()
    };
    let caches = Caches::new(&config);
    caches
        .blocked
        .reload(blocked.iter().map(ToString::to_string).collect());
    let (tx, log) = mpsc::channel(64);
    let handler = Handler::new(Arc::new(config), upstream, &caches, QuestionSink::new(tx));
    Pipeline {
        handler,
        caches,
        log,
    }
}

fn query(name: &str, rtype: RecordType, id: u16) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_ascii(name).unwrap(), rtype));
    message
}

fn single_address(response: &Message) -> RData {
    assert_eq!(response.answers().len(), 1);
    response.answers()[0].data().cloned().unwrap()
}

#[tokio::test]
async fn cached_answer_is_served_without_upstream() {
    let upstream = CountingUpstream::answering(Ipv4Addr::new(93, 184, 216, 34));
    let p = pipeline(upstream.clone(), &[]);

    let first = p
        .handler
        .resolve(&query("example.com.", RecordType::A, 1), Transport::Udp, CLIENT)
        .await;
    let second = p
        .handler
        .resolve(&query("example.com.", RecordType::A, 2), Transport::Udp, CLIENT)
        .await;

    assert_eq!(upstream.calls(), 1);
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);
    assert_eq!(single_address(&second), RData::A(Ipv4Addr::new(93, 184, 216, 34)));
    assert_eq!(p.caches.positive.len(), 1);
}

#[tokio::test]
async fn blocked_names_get_the_null_route() {
    let upstream = CountingUpstream::answering(Ipv4Addr::new(93, 184, 216, 34));
    let p = pipeline(upstream.clone(), &["ads.example.com"]);

    let v4 = p
        .handler
        .resolve(&query("ads.example.com.", RecordType::A, 7), Transport::Udp, CLIENT)
        .await;
    let v6 = p
        .handler
        .resolve(&query("ads.example.com.", RecordType::AAAA, 8), Transport::Udp, CLIENT)
        .await;

    assert_eq!(upstream.calls(), 0);
    assert_eq!(v4.response_code(), ResponseCode::NoError);
    assert_eq!(single_address(&v4), RData::A(Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(v4.answers()[0].ttl(), 60);
    assert_eq!(single_address(&v6), RData::AAAA(Ipv6Addr::LOCALHOST));
    assert_eq!(v6.id(), 8);
}

#[tokio::test]
async fn blocking_only_applies_to_address_records() {
    let upstream = CountingUpstream::answering(Ipv4Addr::new(93, 184, 216, 34));
    let p = pipeline(upstream.clone(), &["ads.example.com"]);

    let response = p
        .handler
        .resolve(&query("ads.example.com.", RecordType::TXT, 3), Transport::Udp, CLIENT)
        .await;

    assert_eq!(upstream.calls(), 1);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(p.caches.positive.is_empty());
}

#[tokio::test]
async fn upstream_failure_is_negatively_cached() {
    let upstream = CountingUpstream::unreachable();
    let p = pipeline(upstream.clone(), &[]);

    let first = p
        .handler
        .resolve(&query("down.example.com.", RecordType::A, 4), Transport::Udp, CLIENT)
        .await;
    let second = p
        .handler
        .resolve(&query("down.example.com.", RecordType::A, 5), Transport::Udp, CLIENT)
        .await;

    assert_eq!(upstream.calls(), 1);
    assert_eq!(first.response_code(), ResponseCode::ServFail);
    assert_eq!(second.response_code(), ResponseCode::ServFail);
    assert_eq!(second.id(), 5);
    assert_eq!(second.queries(), first.queries());
    assert!(matches!(
        p.caches.negative.get("down.example.com IN A"),
        Some(CachedResponse::Failed)
    ));
}

#[tokio::test]
async fn every_question_is_logged_once() {
    let upstream = CountingUpstream::answering(Ipv4Addr::new(93, 184, 216, 34));
    let mut p = pipeline(upstream, &["ads.example.com"]);

    p.handler
        .resolve(&query("ads.example.com.", RecordType::A, 1), Transport::Udp, CLIENT)
        .await;
    p.handler
        .resolve(&query("example.com.", RecordType::A, 2), Transport::Tcp, CLIENT)
        .await;
    // served from cache, not logged again
    p.handler
        .resolve(&query("example.com.", RecordType::A, 3), Transport::Udp, CLIENT)
        .await;

    let blocked = p.log.recv().await.unwrap();
    let forwarded = p.log.recv().await.unwrap();
    assert!(p.log.try_recv().is_err());

    assert!(blocked.blocked);
    assert_eq!(blocked.question.name, "ads.example.com");
    assert_eq!(blocked.remote, CLIENT);
    assert!(!forwarded.blocked);
    assert_eq!(forwarded.question.name, "example.com");
    assert_eq!(forwarded.question.qtype, "A");
}

/// Serves `handler` on fresh loopback sockets, returning the UDP and TCP addresses.
async fn serve(handler: Handler) -> (SocketAddr, SocketAddr) {
    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addrs = (udp.local_addr().unwrap(), tcp.local_addr().unwrap());
    let dns_server = server::with_sockets(handler, udp, tcp, Duration::from_secs(5));
    tokio::spawn(dns_server.block_until_done());
    addrs
}

async fn ask_udp(server_addr: SocketAddr, request: &Message) -> Message {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(server_addr).await.unwrap();
    client.send(&request.to_vec().unwrap()).await.unwrap();

    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(Duration::from_secs(5), client.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

#[tokio::test]
async fn serves_queries_over_udp() {
    let upstream = CountingUpstream::answering(Ipv4Addr::new(93, 184, 216, 34));
    let p = pipeline(upstream, &["ads.example.com"]);
    let (udp_addr, _) = serve(p.handler).await;

    let response = ask_udp(udp_addr, &query("ads.example.com.", RecordType::A, 0x4242)).await;

    assert_eq!(response.id(), 0x4242);
    assert_eq!(response.message_type(), MessageType::Response);
    assert_eq!(single_address(&response), RData::A(Ipv4Addr::new(10, 0, 0, 1)));
}

#[tokio::test]
async fn client_hanging_up_before_its_answer_does_not_stop_the_server() {
    let upstream = CountingUpstream::slow(Ipv4Addr::new(93, 184, 216, 34), Duration::from_millis(100));
    let p = pipeline(upstream.clone(), &[]);
    let (udp_addr, tcp_addr) = serve(p.handler).await;

    let wire = query("gone.example.com.", RecordType::A, 1).to_vec().unwrap();
    let mut framed = u16::try_from(wire.len()).unwrap().to_be_bytes().to_vec();
    framed.extend_from_slice(&wire);
    let mut stream = TcpStream::connect(tcp_addr).await.unwrap();
    stream.write_all(&framed).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    // Let the slow upstream answer and the server try to write to the closed connection.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(upstream.calls(), 1);

    let response = ask_udp(udp_addr, &query("still.example.com.", RecordType::A, 2)).await;

    assert_eq!(response.id(), 2);
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(single_address(&response), RData::A(Ipv4Addr::new(93, 184, 216, 34)));
    assert_eq!(upstream.calls(), 2);
}
