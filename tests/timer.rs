use dmg_core::{
    hardware::DmgRevision,
    mmu::{Interrupts, Mmu},
    timer::Timer,
};

/// Timer on the 16-cycle clock (DIV bit 3) with TIMA one step from overflow
/// and the divider one sub-cycle before the falling edge.
fn about_to_overflow() -> Timer {
    let mut t = Timer::new();
    t.div = 0x000F;
    t.write(0xFF07, 0x05);
    t.tima = 0xFF;
    t.tma = 0xAB;
    t
}

#[test]
fn div_increment() {
    let mut t = Timer::new();
    t.step(256);
    assert_eq!(t.read(0xFF04), 1);
    assert!(!t.interrupt_pending());
}

#[test]
fn div_resets_on_write() {
    let mut t = Timer::new();
    t.div = 0xABCD;
    t.write(0xFF04, 0x12);
    assert_eq!(t.read(0xFF04), 0);
    assert_eq!(t.div, 0);
}

#[test]
fn boot_divider_phase_follows_revision() {
    assert_eq!(Timer::new_with_revision(DmgRevision::RevC).div, 0xABCC);
    assert_eq!(Timer::new_with_revision(DmgRevision::Rev0).div, 0x1830);
}

#[test]
fn single_falling_edge_counts_once() {
    let mut t = Timer::new();
    t.write(0xFF07, 0x05);
    // bit 3 rises at 8 and falls at 16
    t.step(15);
    assert_eq!(t.tima, 0);
    t.tick();
    assert_eq!(t.tima, 1);
    t.step(15);
    assert_eq!(t.tima, 1);
    t.tick();
    assert_eq!(t.tima, 2);
}

#[test]
fn overflow_reloads_exactly_four_sub_cycles_later() {
    let mut t = about_to_overflow();
    t.tick();
    assert_eq!(t.tima, 0x00);
    assert!(t.reload_pending());

    for _ in 0..3 {
        t.tick();
        assert_eq!(t.tima, 0x00);
        assert!(!t.interrupt_pending());
    }

    t.tick();
    assert_eq!(t.tima, 0xAB);
    assert!(!t.reload_pending());
    assert!(t.take_interrupt());
    assert!(!t.interrupt_pending());
}

#[test]
fn tima_write_during_delay_cancels_reload() {
    let mut t = about_to_overflow();
    t.tick();
    t.tick();
    t.write(0xFF05, 0x42);
    assert!(!t.reload_pending());
    t.step(8);
    assert_eq!(t.tima, 0x42);
    assert!(!t.interrupt_pending());
}

#[test]
fn tima_write_on_reload_cycle_is_ignored() {
    let mut t = about_to_overflow();
    t.step(5);
    assert_eq!(t.tima, 0xAB);
    t.write(0xFF05, 0x42);
    assert_eq!(t.tima, 0xAB);
    assert!(t.interrupt_pending());
}

#[test]
fn tma_write_on_reload_cycle_reaches_tima() {
    let mut t = about_to_overflow();
    t.step(5);
    t.write(0xFF06, 0xBB);
    assert_eq!(t.tma, 0xBB);
    assert_eq!(t.tima, 0xBB);
}

#[test]
fn tma_write_after_reload_cycle_leaves_tima() {
    let mut t = about_to_overflow();
    t.step(6);
    t.write(0xFF06, 0xBB);
    assert_eq!(t.tma, 0xBB);
    assert_eq!(t.tima, 0xAB);
}

#[test]
fn div_reset_with_selected_bit_high_ticks() {
    let mut t = Timer::new();
    t.div = 0x0200; // bit 9 high
    t.write(0xFF07, 0x04);
    t.write(0xFF04, 0);
    assert_eq!(t.tima, 0);
    t.tick();
    assert_eq!(t.tima, 1);
    t.step(1022);
    assert_eq!(t.tima, 1);
}

#[test]
fn div_reset_with_selected_bit_low_does_not_tick() {
    let mut t = Timer::new();
    t.div = 0x0100; // bit 9 low
    t.write(0xFF07, 0x04);
    t.write(0xFF04, 0);
    t.tick();
    assert_eq!(t.tima, 0);
}

#[test]
fn tac_disable_edge_tick() {
    let mut t = Timer::new();
    t.div = 0x0200;
    t.write(0xFF07, 0x04);
    t.write(0xFF07, 0x00);
    t.tick();
    assert_eq!(t.tima, 1);
    t.step(4096);
    assert_eq!(t.tima, 1);
}

#[test]
fn tac_clock_switch_to_low_bit_ticks() {
    let mut t = Timer::new();
    t.div = 0x0200; // bit 9 high, bit 3 low
    t.write(0xFF07, 0x04);
    t.write(0xFF07, 0x05);
    t.tick();
    assert_eq!(t.tima, 1);
}

#[test]
fn bus_merges_timer_interrupt_into_if() {
    let mut mmu = Mmu::new();
    mmu.if_reg = Interrupts::empty();
    mmu.timer = about_to_overflow();
    mmu.step_timer(4);
    assert!(!mmu.if_reg.contains(Interrupts::TIMER));
    mmu.step_timer(1);
    assert!(mmu.if_reg.contains(Interrupts::TIMER));
    assert_eq!(mmu.read_byte(0xFF05), 0xAB);
}
