//! Scan a model folder, hash anything untracked, and print its records.

use modelmeta_core::{hash_tree, MetadataStore};
use std::path::PathBuf;

fn main() {
    // Get path from args or use current directory
    let folder = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./models"));

    println!("Hashing models under {}", folder.display());
    let store = MetadataStore::new();
    let hashes = hash_tree(&store, &folder, false);
    println!("Hashed {} models", hashes.len());

    let scanned = store.scan_folder(&folder);
    if scanned.is_empty() {
        println!("No models found directly in {}", folder.display());
        return;
    }

    for artifact in scanned {
        println!(
            "  - {} ({} bytes): {}",
            artifact.name,
            artifact.size,
            artifact.metadata.hash.as_deref().unwrap_or("<no hash>")
        );
    }
}
