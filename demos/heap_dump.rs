//! Scripted walk through the allocator: a few call sequences, each followed
//! by a dump of the block chain so the splitting, coalescing and growth
//! behavior can be eyeballed.

use firstfit::Heap;

fn dump(label: &str, heap: &Heap) {
    println!("--- {label}");
    println!("{:>18}  {:>10}  {:>6}", "address", "capacity", "state");

    for block in heap.blocks() {
        println!(
            "{:>18p}  {:>10}  {:>6}",
            block.addr,
            block.capacity,
            if block.is_free { "free" } else { "used" }
        );
    }
}

fn single_allocation() {
    let mut heap = Heap::init(7777).unwrap();
    dump("fresh heap", &heap);

    heap.allocate(555).unwrap();
    dump("after allocate(555)", &heap);
}

fn allocate_then_release() {
    let mut heap = Heap::init(8080).unwrap();

    let block = heap.allocate(2048).unwrap();
    dump("after allocate(2048)", &heap);

    unsafe { heap.release(block.as_ptr()) };
    dump("after release", &heap);
}

fn release_ladder() {
    let mut heap = Heap::init(4444).unwrap();

    let b1 = heap.allocate(100).unwrap();
    let b2 = heap.allocate(200).unwrap();
    let b3 = heap.allocate(300).unwrap();
    let b4 = heap.allocate(400).unwrap();
    dump("four blocks allocated", &heap);

    unsafe {
        heap.release(b3.as_ptr());
        dump("released 300", &heap);

        heap.release(b1.as_ptr());
        dump("released 100", &heap);

        heap.release(b2.as_ptr());
        dump("released 200 (absorbs 300)", &heap);

        heap.release(b4.as_ptr());
        dump("released 400 (absorbs the tail)", &heap);
    }
}

fn overcommit_growth() {
    let mut heap = Heap::init(12000).unwrap();

    heap.allocate(10_000).unwrap();
    dump("after allocate(10000)", &heap);

    heap.allocate(4_000).unwrap();
    dump("after allocate(4000) grew the heap", &heap);
}

fn main() {
    single_allocation();
    allocate_then_release();
    release_ladder();
    overcommit_growth();
}
