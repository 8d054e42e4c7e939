//! Leader and followers meeting through a real rendezvous server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use e2e_bootstrap::{
    coordinator::{
        server::RendezvousState, BeforeSuiteState, ExecutionCoordinator, ExecutorIdentity,
        HttpRendezvous, Rendezvous,
    },
    create_router,
    error::BootstrapError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    token: String,
}

async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(RendezvousState::new()))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

fn coordinator(index: u32, total: u32, url: &str) -> ExecutionCoordinator {
    ExecutionCoordinator::new(
        ExecutorIdentity::new(index, total).unwrap(),
        Arc::new(HttpRendezvous::new(url).unwrap()),
        Duration::from_millis(50),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn test_http_round_trip() {
    let url = spawn_server().await;
    let rendezvous = HttpRendezvous::new(&url).unwrap();

    assert_eq!(rendezvous.fetch().await.unwrap(), BeforeSuiteState::Pending);

    let passed = BeforeSuiteState::Passed {
        payload: "42".to_string(),
    };
    rendezvous.publish(passed.clone()).await.unwrap();
    assert_eq!(rendezvous.fetch().await.unwrap(), passed);

    let err = rendezvous
        .publish(BeforeSuiteState::Passed {
            payload: "43".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Rendezvous(_)));
}

#[tokio::test]
async fn test_followers_receive_leader_payload() {
    let url = spawn_server().await;
    let setups = Arc::new(AtomicUsize::new(0));

    let runs = (1..=4).map(|index| {
        let url = url.clone();
        let setups = setups.clone();
        async move {
            coordinator(index, 4, &url)
                .run_once(|| async move {
                    setups.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, BootstrapError>(Payload {
                        token: "shared".to_string(),
                    })
                })
                .await
        }
    });

    let payloads: Vec<Payload> = join_all(runs)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(setups.load(Ordering::SeqCst), 1);
    assert_eq!(payloads.len(), 4);
    assert!(payloads.iter().all(|p| p.token == "shared"));
}

#[tokio::test]
async fn test_followers_abort_on_leader_failure() {
    let url = spawn_server().await;

    let leader = coordinator(1, 2, &url);
    let follower = coordinator(2, 2, &url);

    let (leader_result, follower_result) = tokio::join!(
        leader.run_once(|| async {
            Err::<Payload, _>(BootstrapError::ip_family("no kubernetes service"))
        }),
        follower.run_once(|| async {
            Ok::<_, BootstrapError>(Payload {
                token: "never".to_string(),
            })
        }),
    );

    assert!(matches!(leader_result, Err(BootstrapError::IpFamily(_))));
    match follower_result {
        Err(BootstrapError::LeaderFailed(reason)) => {
            assert!(reason.contains("no kubernetes service"))
        }
        other => panic!("expected LeaderFailed, got {:?}", other),
    }
}
