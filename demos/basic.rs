use firstfit::Heap;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let mut heap = Heap::init(8000).expect("could not bootstrap the heap");

    let addr1 = heap.allocate(8).expect("allocation failed").as_ptr();
    log_alloc(addr1, 8);

    let addr2 = heap.allocate(64).expect("allocation failed").as_ptr();
    log_alloc(addr2, 64);

    let addr3 = heap.allocate(256).expect("allocation failed").as_ptr();
    log_alloc(addr3, 256);

    unsafe {
        heap.release(addr1);
        heap.release(addr2);
        heap.release(addr3);
    }

    println!("Released all three blocks");

    // First fit hands the first hole back out.
    let addr4 = heap.allocate(8).expect("allocation failed").as_ptr();
    println!("Reused address: {addr4:?} (was {addr1:?})");
}
