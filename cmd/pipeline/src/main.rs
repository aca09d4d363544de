//! Pipeline example
//!
//! A writer thread pushes stamped messages into a blocking stream while a
//! task reads them back through a dispatcher bound to an executor.
//!
//! Usage: pipeline [count]

use corun::{block_on, kinfo, Executor, Message, MessageStream, ReadDispatcher, SyncStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

fn main() {
    corun::init_logging();
    println!("=== corun Pipeline Example ===\n");

    let count: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let stream: Arc<MessageStream<Message<u32>>> = Arc::new(MessageStream::new());
    let executor = Executor::new(3);
    let reader = ReadDispatcher::new(Arc::clone(&stream), executor.handle());
    kinfo!("reader bound to executor '{}'", executor.name());

    let writer = {
        let stream = Arc::clone(&stream);
        thread::Builder::new()
            .name("writer".into())
            .spawn(move || {
                for i in 1..=count {
                    stream.write_sync(Message::from(i));
                    println!("[Writer] Wrote: {}", i);
                    thread::sleep(Duration::from_millis(10));
                }
                // Readers drain what is left, then see Empty
                stream.stop();
                println!("[Writer] Done!");
            })
            .expect("failed to spawn writer thread")
    };

    let received = block_on(async move {
        let mut msg = Message::default();
        let mut received = 0u32;
        while reader.read(&mut msg).await.is_good() {
            let millis = msg
                .timestamp
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            println!(
                "[Reader] Received: {} (serial {}, at {} ms, on {})",
                msg.payload,
                msg.serial_number,
                millis,
                thread::current().name().unwrap_or("?"),
            );
            received += 1;
        }
        println!("[Reader] Stream empty, done!");
        received
    });

    writer.join().expect("writer thread panicked");
    if let Err(e) = executor.shutdown() {
        eprintln!("executor shutdown failed: {}", e);
    }

    println!("\nMessages: {}/{}", received, count);
    println!("\n=== Example Complete ===");
}
