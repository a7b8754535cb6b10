// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

use std::{cell::RefCell, rc::Rc};

use simgdb::{
    arch::Riscv64,
    context::{ContextHandle, ContextId, ExecutionContext},
    machine::SimpleCpu,
    memory::{Address, MemoryMap, MemoryRegion, MemorySize},
    registry::{RegistryError, ThreadRegistry},
};

fn make_cpus(count: u32) -> Vec<ContextHandle> {
    let memory = MemoryMap::builder(MemorySize(MemorySize::MiB))
        .with_region(MemoryRegion::new("ram", MemorySize(MemorySize::KiB), Address(0)).unwrap())
        .unwrap()
        .build();
    let memory = Rc::new(RefCell::new(memory));
    (0..count)
        .map(|id| {
            let cpu = SimpleCpu::new(ContextId(id), &Riscv64, Rc::clone(&memory), Address(0));
            Rc::new(RefCell::new(cpu)) as ContextHandle
        })
        .collect()
}

#[test_log::test]
fn test_add_and_select() {
    let cpus = make_cpus(3);
    let mut registry = ThreadRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.selected().is_none());
    for cpu in &cpus {
        registry.add(Rc::clone(cpu)).unwrap();
    }
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.selected_id(), Some(ContextId(0)));
    assert_eq!(
        registry.add(Rc::clone(&cpus[1])),
        Err(RegistryError::Duplicate(ContextId(1)))
    );
    assert_eq!(registry.len(), 3);

    assert!(registry.select(ContextId(2)));
    assert!(!registry.select(ContextId(7)));
    assert_eq!(registry.selected_id(), Some(ContextId(2)));
    assert_eq!(registry.selected().unwrap().borrow().id(), ContextId(2));
    assert!(registry.contains(ContextId(1)));
    assert!(!registry.contains(ContextId(3)));
    assert_eq!(
        registry.ids().collect::<Vec<_>>(),
        [ContextId(0), ContextId(1), ContextId(2)]
    );
}

#[test_log::test]
fn test_replace_keeps_selection() {
    let cpus = make_cpus(2);
    let mut registry = ThreadRegistry::new();
    registry.add(Rc::clone(&cpus[0])).unwrap();
    registry.add(Rc::clone(&cpus[1])).unwrap();
    registry.select(ContextId(1));

    let replacement = make_cpus(2).remove(1);
    replacement.borrow_mut().write_reg(3, 0xabcd);
    let old = registry.replace(Rc::clone(&replacement)).unwrap();
    assert!(Rc::ptr_eq(&old, &cpus[1]));
    assert_eq!(registry.selected_id(), Some(ContextId(1)));
    assert_eq!(registry.selected().unwrap().borrow().read_reg(3), 0xabcd);

    let stranger = make_cpus(5).remove(4);
    assert!(matches!(
        registry.replace(stranger),
        Err(RegistryError::Unknown(ContextId(4)))
    ));
}

#[test_log::test]
fn test_thread_info_paging() {
    let mut registry = ThreadRegistry::new();
    assert_eq!(registry.thread_info_first(4), "l");
    for cpu in make_cpus(17) {
        registry.add(cpu).unwrap();
    }
    assert_eq!(registry.thread_info_first(8), "m1,2,3,4,5,6,7,8");
    assert_eq!(registry.thread_info_next(8), "m9,a,b,c,d,e,f,10");
    assert_eq!(registry.thread_info_next(8), "m11");
    assert_eq!(registry.thread_info_next(8), "l");
    assert_eq!(registry.thread_info_next(8), "l");
    // A new enumeration starts over.
    assert_eq!(registry.thread_info_first(32).matches(',').count(), 16);
}
