//! Load testing for the HTTP and WebSocket paths.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use http_ws_server::{Response, Server};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_performance() {
    let root = tempfile::tempdir().unwrap();
    let mut server = Server::new(common::test_config(root.path()));
    server
        .on_request(|_| Response::text("Hello from server", "text/plain"))
        .on_message(|conn, message| {
            let _ = conn.send(message);
        });
    let server = common::start_server(server).await;

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = server.http_url("/");
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() && res.text().await.is_ok() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_requests, "some requests failed");

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- HTTP Load Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_websocket_echo_load() {
    let root = tempfile::tempdir().unwrap();
    let mut server = Server::new(common::test_config(root.path()));
    server.on_message(|conn, message| {
        let _ = conn.send(message);
    });
    let server = common::start_server(server).await;

    let clients = 20;
    let messages_per_client = 100;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for c in 0..clients {
        let url = server.ws_url("/echo");
        tasks.push(tokio::spawn(async move {
            let (mut ws, _) = connect_async(url).await.unwrap();
            for i in 0..messages_per_client {
                let text = format!("{c}:{i}");
                ws.send(Message::text(text.clone())).await.unwrap();
                let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap();
                assert_eq!(reply, Message::text(text));
            }
            let _ = ws.close(None).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    println!("\n--- WebSocket Echo Results ---");
    println!("Messages:       {}", clients * messages_per_client);
    println!("Total Duration: {:?}", start.elapsed());
    println!("------------------------------\n");

    server.stop().await;
}
