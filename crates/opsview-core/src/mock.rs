//! Mock cluster source for running without an orchestration API.
//!
//! Each mock cluster has a fixed layout (node and pod names) derived from
//! the seed, while pod phases, restart counts, and node usage vary from
//! poll to poll. Successive polls therefore share most of their structure
//! and exercise the delta path the way a real cluster would.

use std::sync::atomic::{AtomicU64, Ordering};

use opsview_types::{Document, Entity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::source::{EntitySource, SourceError};

/// Namespaces pods are spread across.
const NAMESPACES: [&str; 3] = ["default", "kube-system", "monitoring"];

/// Application labels assigned to pods.
const APPLICATIONS: [&str; 5] = ["api", "worker", "ingress", "metrics", "db"];

/// Phases a non-running pod can be in.
const OTHER_PHASES: [&str; 3] = ["Pending", "Succeeded", "Failed"];

/// Generates a fixed number of fake clusters.
#[derive(Debug)]
pub struct MockSource {
    clusters: u64,
    seed: u64,
    polls: AtomicU64,
}

impl MockSource {
    /// Create a source producing `clusters` clusters from `seed`.
    pub const fn new(clusters: u64, seed: u64) -> Self {
        Self {
            clusters,
            seed,
            polls: AtomicU64::new(0),
        }
    }

    fn cluster(&self, index: u64, poll: u64) -> Entity {
        let mut layout = StdRng::seed_from_u64(self.seed.wrapping_add(index));
        let mut volatile =
            StdRng::seed_from_u64(self.seed ^ poll.rotate_left(17) ^ index.rotate_left(41));

        let id = format!("mock-cluster-{index}");
        let node_count = layout.random_range(2..6_u32);
        let nodes: Vec<(String, Document)> = (0..node_count)
            .map(|n| {
                let name = format!("node-{n}");
                let node = mock_node(&name, n == 0, &mut layout, &mut volatile);
                (name, node)
            })
            .collect();

        let document = Document::map([
            ("id", Document::from(id.as_str())),
            (
                "api_server_url",
                Document::from(format!("https://kube-{index}.example.org")),
            ),
            ("nodes", Document::map(nodes)),
        ]);
        Entity::new(id, document)
    }
}

fn mock_node(name: &str, master: bool, layout: &mut StdRng, volatile: &mut StdRng) -> Document {
    let pod_count = layout.random_range(3..12_u32);
    let pods: Vec<(String, Document)> = (0..pod_count)
        .filter_map(|p| {
            let namespace = NAMESPACES.get(layout.random_range(0..NAMESPACES.len())).copied()?;
            let application = APPLICATIONS
                .get(layout.random_range(0..APPLICATIONS.len()))
                .copied()?;
            // A small share of pods come and go between polls.
            if !volatile.random_bool(0.95) {
                return None;
            }
            let pod_name = format!("{application}-{name}-{p}");
            Some((
                format!("{namespace}/{pod_name}"),
                mock_pod(&pod_name, namespace, application, volatile),
            ))
        })
        .collect();

    Document::map([
        ("name", Document::from(name)),
        (
            "labels",
            Document::map([("master", Document::from(if master { "true" } else { "false" }))]),
        ),
        (
            "status",
            Document::map([(
                "capacity",
                Document::map([
                    ("cpu", Document::from("4")),
                    ("memory", Document::from("32Gi")),
                    ("pods", Document::from("110")),
                ]),
            )]),
        ),
        (
            "usage",
            Document::map([
                ("cpu", Document::from(format!("{}m", volatile.random_range(100..4000_u32)))),
                (
                    "memory",
                    Document::from(format!("{}Mi", volatile.random_range(512..30000_u32))),
                ),
            ]),
        ),
        ("pods", Document::map(pods)),
    ])
}

fn mock_pod(name: &str, namespace: &str, application: &str, volatile: &mut StdRng) -> Document {
    let phase = if volatile.random_bool(0.9) {
        "Running"
    } else {
        OTHER_PHASES
            .get(volatile.random_range(0..OTHER_PHASES.len()))
            .copied()
            .unwrap_or("Pending")
    };
    let ready = phase == "Running";
    let restarts = if volatile.random_bool(0.1) {
        volatile.random_range(1..5_u64)
    } else {
        0
    };

    Document::map([
        ("name", Document::from(name)),
        ("namespace", Document::from(namespace)),
        ("labels", Document::map([("application", Document::from(application))])),
        ("phase", Document::from(phase)),
        (
            "containers",
            Document::from(vec![Document::map([
                ("name", Document::from(application)),
                ("image", Document::from(format!("registry.example.org/{application}:1.0"))),
                ("ready", Document::from(ready)),
                ("restartCount", Document::from(restarts)),
            ])]),
        ),
    ])
}

impl EntitySource for MockSource {
    async fn fetch(&self) -> Result<Vec<Entity>, SourceError> {
        let poll = self.polls.fetch_add(1, Ordering::Relaxed);
        Ok((0..self.clusters)
            .map(|index| self.cluster(index, poll))
            .collect())
    }
}
