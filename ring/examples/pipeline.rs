// examples/pipeline.rs
use gated_ring::{AsyncCircularBuffer, DequeueError};
use std::{sync::Arc, thread, time::Duration};

const STAGES: usize = 3;
const JOBS_PER_STAGE: usize = 4;

#[tokio::main]
async fn main() {
  println!("--- Ring: Async Producers, Async Consumer ---");
  {
    let buffer = Arc::new(
      AsyncCircularBuffer::builder()
        .capacity(2)
        .name("jobs")
        .build()
        .expect("capacity is non-zero"),
    );

    let mut producers = Vec::new();
    for stage in 0..STAGES {
      let buffer = buffer.clone();
      producers.push(tokio::spawn(async move {
        for job in 0..JOBS_PER_STAGE {
          let msg = format!("Stage{}-Job{}", stage, job);
          println!("[Producer {}] Enqueueing: {}", stage, msg);
          buffer.enqueue(msg).await.unwrap();
        }
      }));
    }

    for _ in 0..STAGES * JOBS_PER_STAGE {
      let job = buffer.dequeue().await.unwrap();
      println!("[Consumer] Dequeued: {} (len {}, waiting {})", job, buffer.len(), buffer.waiting());
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in producers {
      handle.await.unwrap();
    }
  }

  println!("\n--- Ring: Blocking Consumer, Dispose ---");
  {
    let buffer = Arc::new(AsyncCircularBuffer::<u64>::new(4).unwrap());
    let consumer_buffer = buffer.clone();
    let consumer = thread::spawn(move || loop {
      match consumer_buffer.dequeue_blocking() {
        Ok(value) => println!("[Blocking Consumer] Received: {}", value),
        Err(DequeueError::Disposed) => {
          println!("[Blocking Consumer] Buffer disposed.");
          break;
        }
      }
    });

    for value in 0..5u64 {
      buffer.enqueue(value * 10).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    buffer.dispose();
    consumer.join().unwrap();
  }
}
