//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> fan-out -> transport 端到端测试
//! - 背压与故障隔离场景

#[cfg(test)]
mod support;

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, ContractError, PoolSettings};

    #[test]
    fn test_contract_defaults() {
        assert_eq!(ConfigVersion::default(), ConfigVersion::V1);

        let pool = PoolSettings::default();
        assert_eq!((pool.min_workers, pool.max_workers), (8, 100));
        assert_eq!(pool.queue_capacity, 2000);
    }

    #[test]
    fn test_error_classification() {
        assert!(ContractError::connection_unavailable("t", "down").is_transient());
        assert!(ContractError::send_failure("t", "rejected").is_transient());
        assert!(ContractError::configuration("f", "bad").is_configuration());
        assert!(!ContractError::configuration("f", "bad").is_transient());
    }
}

#[cfg(test)]
mod e2e_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Attribute, AttributeType, Event, PoolSettings, StreamDefinition, TransportDescriptor};
    use dispatcher::{create_sink_callback, SinkCallbackBuilder};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use crate::support::recording_registry;

    fn stock_stream() -> StreamDefinition {
        StreamDefinition::new(
            "StockStream",
            vec![
                Attribute::new("symbol", AttributeType::String),
                Attribute::new("price", AttributeType::Double),
            ],
        )
    }

    fn stock(ts: i64, symbol: &str, price: f64) -> Event {
        Event::new(ts, vec![symbol.into(), price.into()])
    }

    /// Config file -> SinkCallback -> FileTransport
    ///
    /// 验证完整的数据流：
    /// 1. ConfigLoader 解析 TOML
    /// 2. 按 routing key 将事件写入不同文件
    /// 3. shutdown 后所有已接收事件落盘
    #[tokio::test]
    async fn test_e2e_file_transport_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
version = "V1"

[stream]
id = "StockStream"
attributes = [
    {{ name = "symbol", type = "string" }},
    {{ name = "price", type = "double" }},
]

[[transports]]
name = "archive"
type = "file"
destination = "{}"
routing_key = "stock-{{{{symbol}}}}"
properties = "sync:false, junk"

[transports.pool]
min_workers = 1
max_workers = 2
queue_capacity = 64

[[transports]]
name = "audit"
type = "log"
"#,
            dir.path().display()
        );

        let blueprint = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        let callback = create_sink_callback(&blueprint).await.unwrap();
        assert_eq!(callback.transport_count(), 2);
        assert_eq!(callback.pool_count(), 2);

        callback.receive(&[stock(1, "IBM", 75.5), stock(2, "WSO2", 12.0), stock(3, "IBM", 76.0)]);
        callback.shutdown().await;

        let ibm = std::fs::read_to_string(dir.path().join("stock-IBM.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = ibm
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["destination"], "stock-IBM");
        assert_eq!(lines[0]["timestamp"], 1);
        assert_eq!(lines[1]["data"]["price"], 76.0);

        let wso2 = std::fs::read_to_string(dir.path().join("stock-WSO2.jsonl")).unwrap();
        assert_eq!(wso2.lines().count(), 1);

        for (name, snapshot) in callback.metrics() {
            assert_eq!(snapshot.sent, 3, "transport {name}");
            assert_eq!(snapshot.rejected(), 0, "transport {name}");
        }
    }

    /// Three transports, queue capacity 2, five events: every transport
    /// accepts exactly two and rejects three, and the pipeline never blocks.
    #[tokio::test]
    async fn test_e2e_saturation_is_per_transport() {
        let (registry, recorded) = recording_registry();
        let pool = PoolSettings::new(1, 1, 2);
        let descriptors = ["kafka", "http", "file"]
            .into_iter()
            .map(|name| {
                TransportDescriptor::new(name, "recording")
                    .with_pool(pool)
                    .with_param("delay_ms", "20")
            })
            .collect();

        let callback = SinkCallbackBuilder::new(stock_stream(), descriptors)
            .with_registry(registry)
            .build()
            .await
            .unwrap();
        assert_eq!(callback.pool_count(), 3);

        let events: Vec<_> = (0..5).map(|ts| stock(ts, "IBM", 1.0)).collect();
        callback.receive(&events);

        for (name, snapshot) in callback.metrics() {
            assert_eq!(snapshot.submitted, 2, "transport {name}");
            assert_eq!(snapshot.saturated, 3, "transport {name}");
        }

        callback.shutdown().await;

        for name in ["kafka", "http", "file"] {
            let transport = recorded.get(name);
            assert_eq!(transport.sent_timestamps(), vec![0, 1], "transport {name}");
            assert_eq!(transport.shutdowns(), 1);
        }
    }

    /// A transport whose sends fail does not affect its siblings
    #[tokio::test]
    async fn test_e2e_failing_transport_is_isolated() {
        let (registry, recorded) = recording_registry();
        let descriptors = vec![
            TransportDescriptor::new("healthy", "recording")
                .with_routing_key("{{symbol}}")
                .with_pool(PoolSettings::new(1, 2, 16)),
            TransportDescriptor::new("broken", "recording")
                .with_pool(PoolSettings::new(1, 2, 16))
                .with_param("fail", "true"),
        ];

        let callback = SinkCallbackBuilder::new(stock_stream(), descriptors)
            .with_registry(registry)
            .build()
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        let task = callback.spawn(rx);
        tx.send(vec![stock(1, "IBM", 1.0), stock(2, "ORCL", 2.0)]).await.unwrap();
        tx.send(vec![]).await.unwrap();
        tx.send(vec![stock(3, "IBM", 3.0)]).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let healthy = recorded.get("healthy");
        let mut sent = healthy.sent();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("IBM".to_string(), 1),
                ("IBM".to_string(), 3),
                ("ORCL".to_string(), 2)
            ]
        );
        assert_eq!(recorded.get("broken").attempts(), 3);
        assert!(recorded.get("broken").sent().is_empty());
    }

    /// A transport that cannot connect aborts startup; it and the others are closed
    #[tokio::test]
    async fn test_e2e_connect_failure_rolls_back() {
        let (registry, recorded) = recording_registry();
        let descriptors = vec![
            TransportDescriptor::new("first", "recording").with_pool(PoolSettings::new(1, 1, 4)),
            TransportDescriptor::new("second", "recording")
                .with_pool(PoolSettings::new(1, 1, 4))
                .with_param("refuse_connect", "true"),
        ];

        let err = SinkCallbackBuilder::new(stock_stream(), descriptors)
            .with_registry(registry)
            .build()
            .await
            .err()
            .expect("startup must fail");
        assert!(err.to_string().contains("second"), "got: {err}");

        assert_eq!(recorded.get("first").shutdowns(), 1);
        assert_eq!(recorded.get("second").shutdowns(), 1);
    }

    /// NetworkTransport over TCP: length-prefixed JSON envelopes
    #[tokio::test]
    async fn test_e2e_network_transport_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frames = Vec::new();
            loop {
                let len = match socket.read_u32().await {
                    Ok(len) => len as usize,
                    Err(_) => break,
                };
                let mut payload = vec![0u8; len];
                socket.read_exact(&mut payload).await.unwrap();
                frames.push(serde_json::from_slice::<serde_json::Value>(&payload).unwrap());
            }
            frames
        });

        let descriptor = TransportDescriptor::new("ticker", "network")
            .with_destination(addr.to_string())
            .with_routing_key("stock-{{symbol}}")
            .with_properties("tcp.nodelay:true,send.timeout.ms:1000,malformed")
            .with_pool(PoolSettings::new(1, 1, 16));

        let callback = SinkCallbackBuilder::new(stock_stream(), vec![descriptor])
            .build()
            .await
            .unwrap();

        callback.receive(&[stock(10, "IBM", 75.5), stock(11, "WSO2", 12.25)]);
        callback.shutdown().await;

        let frames = server.await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["stream"], "StockStream");
        assert_eq!(frames[0]["destination"], "stock-IBM");
        assert_eq!(frames[1]["destination"], "stock-WSO2");
        assert_eq!(frames[1]["data"]["price"], 12.25);

        let metrics = callback.metrics();
        assert_eq!(metrics[0].1.sent, 2);
    }

    /// Identical pool settings share one queue when sharing is enabled
    #[tokio::test]
    async fn test_e2e_shared_pools() {
        let (registry, recorded) = recording_registry();
        let pool = PoolSettings::new(1, 4, 32);
        let descriptors = vec![
            TransportDescriptor::new("a", "recording").with_pool(pool),
            TransportDescriptor::new("b", "recording").with_pool(pool),
        ];

        let callback = SinkCallbackBuilder::new(stock_stream(), descriptors)
            .with_registry(registry)
            .with_shared_pools(true)
            .build()
            .await
            .unwrap();
        assert_eq!(callback.pool_count(), 1);

        callback.receive(&[stock(1, "IBM", 1.0)]);
        callback.shutdown().await;

        assert_eq!(recorded.get("a").sent_timestamps(), vec![1]);
        assert_eq!(recorded.get("b").sent_timestamps(), vec![1]);
    }
}
