//! vault-root — the label registry and garbage collector: the
//! authoritative store of mutable label → root-key bindings, reachable
//! over RPC from every minion, plus the mark-sweep collector that frees
//! chunks no label or lease keeps alive.

pub mod log;
pub mod roots;
pub mod rpc;
