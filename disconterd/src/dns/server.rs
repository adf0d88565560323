use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{Context, Result};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, SRV};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::resolver::{self, AnswerRecord, QueryType, RecordData};

const MAX_DATAGRAM: usize = 4096;

/// State shared by every query task
#[derive(Clone)]
pub struct DnsState {
    pub registry: Arc<Registry>,
    pub metrics: Metrics,
    pub zone: String,
}

/// Answer UDP queries until cancelled
pub async fn serve(listen: String, state: DnsState, cancel: CancellationToken) -> Result<()> {
    let socket = UdpSocket::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind DNS socket {}", listen))?;
    let socket = Arc::new(socket);

    tracing::info!("DNS listening on {} for zone {}.", listen, state.zone);

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, src) = received.context("Failed to receive DNS datagram")?;
                let request = buf[..len].to_vec();
                let socket = socket.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    handle_datagram(&socket, &state, &request, src).await;
                });
            }
            _ = cancel.cancelled() => {
                tracing::info!("DNS listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_datagram(socket: &UdpSocket, state: &DnsState, request: &[u8], src: SocketAddr) {
    let request = match Message::from_vec(request) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Dropping malformed DNS datagram from {}: {}", src, e);
            return;
        }
    };

    let response = answer(state, &request, src);
    let sent = match response.to_vec() {
        Ok(bytes) => socket.send_to(&bytes, src).await.map(|_| ()).map_err(anyhow::Error::from),
        Err(e) => Err(anyhow::Error::from(e)),
    };

    if let Err(e) = sent {
        tracing::error!("DNS reply to {} failed: {}", src, e);
        state.metrics.dns_error();
    }
}

/// Build the response to one request against the registry as it is right now
pub fn answer(state: &DnsState, request: &Message, src: SocketAddr) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_authoritative(true);
    response.add_queries(request.queries().to_vec());

    if request.op_code() != OpCode::Query {
        response.set_response_code(ResponseCode::NotImp);
        return response;
    }

    let snapshot = state.registry.read();

    for query in request.queries() {
        let query_name = query.name().to_string();
        let record_type = query.query_type();

        tracing::debug!("DNS query record: {} {} {}", src.ip(), query_name.to_ascii_lowercase(), record_type);
        state.metrics.dns_query(&record_type.to_string());

        if !resolver::in_zone(&state.zone, &query_name) {
            response.set_response_code(ResponseCode::Refused);
            continue;
        }

        let resolved = resolver::resolve(&state.zone, &query_name, query_type(record_type), &snapshot.instances);
        if resolved.is_empty() {
            tracing::debug!("No records for {} {}", query_name, record_type);
            continue;
        }
        for record in &resolved.answers {
            if let Some(record) = to_record(record) {
                response.add_answer(record);
            }
        }
        for record in &resolved.additionals {
            if let Some(record) = to_record(record) {
                response.add_additional(record);
            }
        }
    }

    response
}

fn query_type(record_type: RecordType) -> QueryType {
    match record_type {
        RecordType::A => QueryType::Address,
        RecordType::SRV => QueryType::Locator,
        RecordType::ANY => QueryType::Any,
        _ => QueryType::Other,
    }
}

fn to_record(record: &AnswerRecord) -> Option<Record> {
    let name = fqdn(&record.name)?;
    let rdata = match &record.data {
        RecordData::Address(address) => RData::A(A(*address)),
        RecordData::Locator { priority, weight, port, target } => {
            RData::SRV(SRV::new(*priority, *weight, *port, fqdn(target)?))
        }
    };
    Some(Record::from_rdata(name, record.ttl, rdata))
}

fn fqdn(name: &str) -> Option<Name> {
    match Name::from_ascii(name) {
        Ok(mut name) => {
            name.set_fqdn(true);
            Some(name)
        }
        Err(e) => {
            tracing::debug!("Skipping record with invalid name {}: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use hickory_proto::op::Query;
    use shared::types::{ServiceConfig, ServiceInstance};
    use crate::registry::Snapshot;

    fn state() -> DnsState {
        let registry = Arc::new(Registry::new());
        let mut config = ServiceConfig::new("api");
        config.port = 8080;
        config.ttl = 30;
        registry.replace(Snapshot::new(vec![ServiceInstance {
            id: "c1".to_string(),
            name: "web1".to_string(),
            address: Ipv4Addr::new(10, 0, 0, 1),
            service: config,
        }]));

        DnsState {
            registry,
            metrics: Metrics::new("test").unwrap(),
            zone: "disconter".to_string(),
        }
    }

    fn request(name: &str, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query);
        message.add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
        message
    }

    fn src() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_address_answer() {
        let response = answer(&state(), &request("web1.container.disconter.", RecordType::A), src());

        assert_eq!(response.id(), 4242);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.queries().len(), 1);
        assert_eq!(response.answers().len(), 1);

        let record = &response.answers()[0];
        assert_eq!(record.ttl(), 30);
        assert_eq!(record.data(), Some(&RData::A(A(Ipv4Addr::new(10, 0, 0, 1)))));
    }

    #[test]
    fn test_srv_answer_carries_additional_address() {
        let response = answer(&state(), &request("_api._tcp.service.disconter.", RecordType::SRV), src());

        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.additionals().len(), 1);

        match response.answers()[0].data() {
            Some(RData::SRV(srv)) => {
                assert_eq!(srv.port(), 8080);
                assert_eq!(srv.target(), &Name::from_ascii("web1.container.disconter.").unwrap());
            }
            other => panic!("unexpected answer: {:?}", other),
        }
        assert_eq!(
            response.additionals()[0].name(),
            &Name::from_ascii("web1.container.disconter.").unwrap()
        );
    }

    #[test]
    fn test_mixed_case_names_answer() {
        let mut state = state();
        state.zone = "Disconter".to_string();
        let mut config = ServiceConfig::new("MyApi");
        config.port = 9000;
        state.registry.replace(Snapshot::new(vec![ServiceInstance {
            id: "c2".to_string(),
            name: "Web".to_string(),
            address: Ipv4Addr::new(10, 0, 0, 2),
            service: config,
        }]));

        let response = answer(&state, &request("web.container.disconter.", RecordType::A), src());
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);

        let response = answer(&state, &request("_myapi._tcp.service.DISCONTER.", RecordType::SRV), src());
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.additionals().len(), 1);
    }

    #[test]
    fn test_unknown_name_in_zone_is_empty_noerror() {
        let response = answer(&state(), &request("db.container.disconter.", RecordType::A), src());

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.answers().is_empty());
    }

    #[test]
    fn test_out_of_zone_refused() {
        let response = answer(&state(), &request("example.com.", RecordType::A), src());

        assert_eq!(response.response_code(), ResponseCode::Refused);
        assert!(response.answers().is_empty());
    }

    #[test]
    fn test_queries_are_counted() {
        let state = state();
        answer(&state, &request("web1.container.disconter.", RecordType::A), src());
        answer(&state, &request("api.service.disconter.", RecordType::SRV), src());

        let output = state.metrics.export().unwrap();
        assert!(output.contains(r#"disconter_dns_queries{type="A"} 1"#));
        assert!(output.contains(r#"disconter_dns_queries{type="SRV"} 1"#));
        assert!(output.contains("disconter_dns_queries_total 2"));
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let state = state();
        let cancel = CancellationToken::new();

        // Reserve a free port, then hand it to the listener
        let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let server = tokio::spawn(serve(addr.to_string(), state, cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bytes = request("web1.container.disconter.", RecordType::A).to_vec().unwrap();
        client.send_to(&bytes, addr).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(response.answers().len(), 1);

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
