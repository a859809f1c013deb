//! A guest process's VM table and its page-watch table, driven together the way
//! `gpu-device`'s `map_memory`/`protect_memory` façade methods drive them: mapping a
//! range arms a write watch, and a write landing inside a watched range must surface
//! exactly once on the cache-update channel.

use gpu_cache::PageTable;
use gpu_device::VmTable;
use gpu_types::{AddressRange, VmId};

#[test]
fn two_processes_vm_windows_never_overlap() {
    let vm0 = VmId::new(0);
    let vm1 = VmId::new(1);
    let mut table0 = VmTable::new(vm0);
    let mut table1 = VmTable::new(vm1);

    table0.map(0x1000, 0x1000, 0, 0, 0x3, 0);
    table1.map(0x1000, 0x1000, 0, 0, 0x3, 0);

    assert!(table0.is_mapped(0x1000));
    assert!(table1.is_mapped(0x1000));
    assert_eq!(vm0.window_base(), 0);
    assert_ne!(vm0.window_base(), vm1.window_base());
    assert!(!vm0.window().intersects(vm1.window()));
}

#[test]
fn mapping_arms_a_write_watch_that_a_guest_write_then_clears() {
    let vm_id = VmId::new(2);
    let mut vm_table = VmTable::new(vm_id);
    let page_table = PageTable::new(vm_id);

    let address = 0x4000u64;
    let size = 0x1000u64;
    vm_table.map(address, size, 0, 3, 0x3, 0);
    assert!(vm_table.is_mapped(address));

    let range = AddressRange::from_begin_size(address, size);
    page_table.watch_writes(range);
    assert!(page_table.get(address).contains(gpu_cache::PageFlags::WRITE_WATCH));

    page_table.notify_write(vm_id, address);
    let flags = page_table.get(address);
    assert!(!flags.contains(gpu_cache::PageFlags::WRITE_WATCH));
    assert!(flags.contains(gpu_cache::PageFlags::INVALIDATED));

    let changes = page_table.changes.drain();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, vm_id);
}

#[test]
fn unmapping_clears_reachability_without_touching_the_page_watch_state() {
    let vm_id = VmId::new(3);
    let mut vm_table = VmTable::new(vm_id);
    let page_table = PageTable::new(vm_id);

    vm_table.map(0x8000, 0x1000, 0, 1, 0x3, 0);
    page_table.watch_writes(AddressRange::from_begin_size(0x8000, 0x1000));

    vm_table.unmap(0x8000, 0x1000);
    assert!(!vm_table.is_mapped(0x8000));
    // The page table is owned independently of the VM table's address reservations;
    // unmapping the VM range does not retroactively un-arm an already-armed watch.
    assert!(page_table.get(0x8000).contains(gpu_cache::PageFlags::WRITE_WATCH));
}
