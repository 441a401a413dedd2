use std::{error::Error, io, ptr};

use arenaio::{ArenaConfig, Heap};
use tracing_subscriber::EnvFilter;

/// Prints the free list, lowest offset first.
fn print_free_list(
  heap: &Heap,
  label: &str,
) {
  let extents: Vec<String> = heap
    .free_extents()
    .map(|extent| format!("{}..{}", extent.offset, extent.end()))
    .collect();

  println!("[{}] free extents: {}", label, extents.join(", "));
}

fn main() -> Result<(), Box<dyn Error>> {
  // RUST_LOG=arenaio=trace shows every allocate/release.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  // A small arena so the free list stays readable.
  let mut heap = Heap::new(ArenaConfig::default().with_capacity(1024))?;
  print_free_list(&heap, "start");

  // --------------------------------------------------------------------
  // 1) Allocate a u32 and write through the pointer.
  // --------------------------------------------------------------------
  let first = heap.allocate(4)?;
  let first_ptr = first.as_ptr() as *mut u32;
  unsafe { first_ptr.write(0xDEADBEEF) };
  println!("\n[1] Allocate u32 at {:?}", first);
  println!("[1] Value = 0x{:X}", unsafe { first_ptr.read() });

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes; the allocation is still a whole granule.
  // --------------------------------------------------------------------
  let second = heap.allocate(12)?;
  unsafe { ptr::write_bytes(second.as_ptr(), 0xAB, 12) };
  println!("\n[2] Allocate [u8; 12] at {:?}", second);
  print_free_list(&heap, "2");

  // --------------------------------------------------------------------
  // 3) Allocate a zeroed [u16; 16].
  // --------------------------------------------------------------------
  let third = heap.allocate_zeroed(16, 2)?;
  println!("\n[3] Allocate zeroed [u16; 16] at {:?}", third);

  // --------------------------------------------------------------------
  // 4) Release the first block and allocate a smaller one: first-fit
  //    hands back the same address.
  // --------------------------------------------------------------------
  heap.release(first.as_ptr())?;
  let fourth = heap.allocate(2)?;
  println!(
    "\n[4] Reused the freed block? {}",
    if fourth == first { "yes" } else { "no" }
  );

  // --------------------------------------------------------------------
  // 5) Release the neighbours and watch them merge.
  // --------------------------------------------------------------------
  heap.release(second.as_ptr())?;
  print_free_list(&heap, "5 after releasing second");
  heap.release(fourth.as_ptr())?;
  print_free_list(&heap, "5 after releasing fourth");

  // --------------------------------------------------------------------
  // 6) Ask for more than the arena holds.
  // --------------------------------------------------------------------
  match heap.allocate(4096) {
    Ok(_) => println!("\n[6] Unexpectedly got 4096 bytes"),
    Err(error) => println!("\n[6] {}", error),
  }

  // --------------------------------------------------------------------
  // 7) Release something twice.
  // --------------------------------------------------------------------
  if let Err(error) = heap.release(second.as_ptr()) {
    println!("\n[7] {}", error);
  }

  // --------------------------------------------------------------------
  // 8) Statistics and the leak report (third is still live).
  // --------------------------------------------------------------------
  println!("\n[8] Statistics:\n{}", heap.statistics());
  heap.write_leak_report(io::stdout().lock())?;

  Ok(())
}
