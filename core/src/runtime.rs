//! Process-wide Fibre state: own node UUID and the registry of remote nodes (spec.md §3, §9).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::info;
use uuid::Uuid;

use crate::config::Config;
use crate::node::RemoteNode;

/// Owns this process's node identity and every `RemoteNode` reached so far.
///
/// Mirrors spec.md §9's "global mutable state becomes a single `Runtime` value owned by the
/// entrypoint" — tests instantiate independent runtimes rather than sharing process globals.
pub struct Runtime {
	pub own_uuid: Uuid,
	config: Config,
	nodes: Mutex<HashMap<Uuid, Arc<RemoteNode>>>,
}

impl Runtime {
	pub fn new(config: Config) -> Arc<Self> {
		fibre_runtime::logger::install(log::LevelFilter::Info);

		let own_uuid = Uuid::new_v4();
		info!("runtime starting with own uuid {own_uuid}");

		Arc::new(Self { own_uuid, config, nodes: Mutex::new(HashMap::new()) })
	}

	/// Look up the `RemoteNode` for `peer_uuid`, creating it (and its scheduler thread) on
	/// first contact — the handshake is what discovers this UUID in the first place.
	pub fn node(&self, peer_uuid: Uuid) -> Arc<RemoteNode> {
		let mut nodes = self.nodes.lock().unwrap();

		nodes
			.entry(peer_uuid)
			.or_insert_with(|| {
				info!("remote node created for peer {peer_uuid}");
				RemoteNode::new(peer_uuid, &self.config)
			})
			.clone()
	}

	/// Drop a remote node from the registry, shutting down its scheduler thread first.
	pub fn forget_node(&self, peer_uuid: Uuid) {
		if let Some(node) = self.nodes.lock().unwrap().remove(&peer_uuid) {
			info!("remote node destroyed for peer {peer_uuid}");
			node.shutdown();
		}
	}

	pub fn node_count(&self) -> usize {
		self.nodes.lock().unwrap().len()
	}
}

impl Drop for Runtime {
	fn drop(&mut self) {
		let peers: Vec<Uuid> = self.nodes.lock().unwrap().keys().copied().collect();

		for peer in peers {
			self.forget_node(peer);
		}
	}
}
