//! Example usage of the typed store.
//!
//! Stores a few records under allocated numeric keys and string keys, then
//! pages through them. Run with `RUST_LOG=debug` to see the store's logs.

use redb_typed::{Key, Page, Store, StoreConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Serialize, Deserialize)]
struct User {
    name: String,
    email: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = Store::open("example.redb", StoreConfig::default())?;

    // Numeric keys come from the store's counter
    for name in ["ada", "brian", "grace"] {
        let key = store.allocate_key();
        store.set(
            key,
            &User {
                name: name.to_string(),
                email: format!("{}@example.com", name),
            },
        );
        // An index entry under a string key pointing back to the record
        store.set(format!("user:{}", name), &key.value());
        println!("stored {} under key {}", name, key);
    }

    let mut user = User::default();
    if store.get_into(Key::new(1), &mut user) {
        println!("key 1 -> {:?}", user);
    }

    println!("index, two entries per page:");
    let mut page = 0;
    loop {
        let mut visited = 0;
        let total = store.scan("user:", Page::new(page, 2), None, |key, id: u32| {
            visited += 1;
            println!("  {} -> {}", String::from_utf8_lossy(key), Key::new(id));
        });
        if visited == 0 || (page + 1) * 2 >= total {
            break;
        }
        page += 1;
    }

    store.delete_all();
    println!("after delete_all the next key is {}", store.allocate_key());

    for err in store.take_errors() {
        eprintln!("swallowed error: {}", err);
    }

    Ok(())
}
