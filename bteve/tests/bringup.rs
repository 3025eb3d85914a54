//! Drives the whole driver against the simulated chip.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bteve::commands::opcodes;
use bteve::config::TimingDimension;
use bteve::interface::fake::{self, BootScript};
use bteve::memory::region::MemoryRegion;
use bteve::models::bt820::BT820;
use bteve::models::Model;
use bteve::registers::Register;
use bteve::{BootParameters, DeviceState, DisplayConfig, Error, EVE};

const FREQ: u32 = 72_000_000;

type MainMem = <BT820 as Model>::MainMem;
type Device<'a> = EVE<BT820, fake::Interface<'a, BT820>>;

struct Memory {
    main: Vec<u8>,
    dl: Vec<u8>,
    cmd: Vec<u8>,
}

impl Memory {
    fn new() -> Self {
        Self {
            main: vec![0; 64 * 1024],
            dl: vec![0; 16 * 1024],
            cmd: vec![0; 16 * 1024],
        }
    }

    fn chip(&mut self) -> fake::Interface<'_, BT820> {
        fake::Interface::new(BT820)
            .with_main_ram(&mut self.main)
            .with_display_list_ram(&mut self.dl)
            .with_cmd_ram(&mut self.cmd)
    }
}

fn ready(chip: fake::Interface<'_, BT820>) -> Device<'_> {
    let mut eve: Device = EVE::new(chip);
    eve.boot(&BootParameters::default()).unwrap();
    eve.configure(&DisplayConfig::compute(800, 480, 60, FREQ))
        .unwrap();
    eve
}

fn chip<'a, 'b>(eve: &'b mut Device<'a>) -> &'b mut fake::Interface<'a, BT820> {
    eve.low_level().borrow_interface()
}

#[test]
fn flush_succeeds_on_the_poll_that_catches_up() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_consume_delay(3));

    let (polls, elapsed) = {
        let c = chip(&mut eve);
        (c.polls(), c.elapsed_ms())
    };
    eve.nop().unwrap();
    eve.dl_start().unwrap();
    eve.wait_flush().unwrap();

    let c = chip(&mut eve);
    // Three polls see the commands still pending, the fourth sees them
    // consumed.
    assert_eq!(c.polls() - polls, 4);
    assert_eq!(c.elapsed_ms() - elapsed, 30);
    assert_eq!(c.rp(), c.wp());
    assert_eq!(eve.wp(), chip(&mut eve).wp());
}

#[test]
fn flush_reports_fault_without_moving_wp() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_fault_on(opcodes::SWAP, b"display list corrupt"));

    eve.dl_start().unwrap();
    eve.swap().unwrap();
    let wp = eve.wp();
    assert_eq!(eve.wait_flush(), Err(Error::Fault));
    assert_eq!(eve.wp(), wp);
    assert!(eve.is_faulted());
    assert_eq!(eve.state(), DeviceState::FaultDetected);

    // The fault stays latched without asking the chip again.
    let polls = chip(&mut eve).polls();
    assert_eq!(eve.wait_flush(), Err(Error::Fault));
    assert_eq!(eve.nop(), Err(Error::Fault));
    assert_eq!(chip(&mut eve).polls(), polls);

    let msg = eve.coprocessor_fault_msg().unwrap();
    assert_eq!(msg.as_str(), Some("display list corrupt"));
}

#[test]
fn reset_twice_recovers_from_fault() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_fault_on(opcodes::SWAP, b"nope"));

    eve.swap().unwrap();
    assert_eq!(eve.wait_flush(), Err(Error::Fault));
    chip(&mut eve).clear_fault_trigger();

    for _ in 0..2 {
        eve.reset_coprocessor().unwrap();
        assert!(!eve.is_faulted());
        assert_eq!(eve.state(), DeviceState::Ready);
        assert!(!chip(&mut eve).is_faulted());
        // The reset leaves three commands behind it in the ring.
        assert_eq!(eve.wp(), 12);
    }

    eve.swap().unwrap();
    eve.wait_flush().unwrap();
}

#[test]
fn reset_ignored_by_chip_fails_verification() {
    let mut mem = Memory::new();
    let mut eve = ready(
        mem.chip()
            .with_stuck_reset()
            .with_fault_on(opcodes::SWAP, b"nope"),
    );

    eve.swap().unwrap();
    assert_eq!(eve.wait_flush(), Err(Error::Fault));
    assert_eq!(eve.reset_coprocessor(), Err(Error::VerificationFailed));
    assert!(eve.is_faulted());
    assert_eq!(eve.state(), DeviceState::FaultDetected);
}

#[test]
fn configure_rejects_cycle_not_longer_than_width() {
    let mut mem = Memory::new();
    let mut eve: Device = EVE::new(mem.chip());

    let wide = DisplayConfig {
        width: 2048,
        horiz: TimingDimension {
            cycle: 2000,
            offset: 20,
            sync0: 0,
            sync1: 10,
        },
        ..DisplayConfig::compute(1920, 1200, 60, FREQ)
    };
    let result = catch_unwind(AssertUnwindSafe(|| eve.configure(&wide)));
    assert!(result.is_err());

    let short = DisplayConfig {
        width: 1920,
        horiz: TimingDimension {
            cycle: 1900,
            offset: 20,
            sync0: 0,
            sync1: 10,
        },
        ..wide
    };
    let result = catch_unwind(AssertUnwindSafe(|| eve.configure(&short)));
    assert!(result.is_err());

    // Nothing reached the chip: it was never even powered.
    let c = chip(&mut eve);
    assert!(!c.is_powered());
    assert_eq!(c.register(Register::HCYCLE), 0);
}

#[test]
fn boot_configure_and_fetch_crc() {
    let mut mem = Memory::new();
    let data = b"The quick brown fox jumps over the lazy dog";
    let (offset, crc) = {
        let dev = mem.chip().with_boot_script(BootScript {
            boot_status_polls: 3,
            engine_busy_polls: 2,
            ..BootScript::default()
        });
        let mut eve: Device = EVE::new(dev);
        eve.boot(&BootParameters::default()).unwrap();
        assert_eq!(eve.chip_id(), BT820::CHIP_ID);
        assert_eq!(eve.state(), DeviceState::EngineWait);

        let config = DisplayConfig::compute(1920, 1200, 60, FREQ);
        assert_eq!(config.pclk, 1);
        assert!(config.horiz.cycle > config.width);
        assert!(config.vert.cycle > config.height);
        assert!(config.horiz.cycle - config.width > config.horiz.offset);
        assert!(config.vert.cycle - config.height > config.vert.offset);
        eve.configure(&config).unwrap();
        assert_eq!(eve.state(), DeviceState::Ready);
        assert_eq!(eve.ram_size(), 1024 * 1024 * 1024);
        assert_eq!(chip(&mut eve).register(Register::HCYCLE), config.horiz.cycle as u32);
        assert_eq!(chip(&mut eve).register(Register::DISP), 1);

        let start = MainMem::ptr(0x1000);
        eve.mem_write(start, data).unwrap();
        let offset = eve.wp();
        let crc = eve
            .mem_crc(start..(start + data.len() as u32))
            .unwrap();
        assert!(!eve.is_faulted());
        (offset as usize, crc)
    };

    assert_eq!(crc, 0x414fa339);
    assert_eq!(&mem.main[0x1000..0x1000 + data.len()], &data[..]);
    // The result word sits after the opcode and its two arguments.
    let placed = u32::from_le_bytes([
        mem.cmd[offset + 12],
        mem.cmd[offset + 13],
        mem.cmd[offset + 14],
        mem.cmd[offset + 15],
    ]);
    assert_eq!(placed, crc);
}

#[test]
fn register_and_image_results() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip());

    assert_eq!(eve.reg_read(Register::FREQUENCY).unwrap(), FREQ);
    eve.reg_write(Register::PWM_DUTY, 64).unwrap();
    assert_eq!(eve.reg_read(Register::PWM_DUTY).unwrap(), 64);

    chip(&mut eve).set_last_image(0x2000, 320, 240, 0x27000);
    let props = eve.get_props().unwrap();
    assert_eq!((props.ptr, props.width, props.height), (0x2000, 320, 240));
    assert_eq!(eve.get_ptr().unwrap().to_raw(), 0x27000);

    let fast = eve.flash_fast().unwrap();
    assert!(fast.is_full_speed());
}

#[test]
fn boot_timeout_leaves_chip_unconfigured() {
    let mut mem = Memory::new();
    let dev = mem.chip().with_boot_script(BootScript {
        boot_status_polls: u32::MAX,
        ..BootScript::default()
    });
    let mut eve: Device = EVE::new(dev);
    let mut timeouts = eve.timeouts();
    timeouts.boot_status = bteve::Retry::new(5, 10);
    eve.set_timeouts(timeouts);

    assert_eq!(eve.boot(&BootParameters::default()), Err(Error::Timeout));
    assert_eq!(eve.state(), DeviceState::ClockConfigured);
    assert!(eve.display_config().is_none());
}

#[test]
fn writer_waits_for_space_instead_of_overrunning() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_consume_delay(5));
    let (elapsed, executed) = {
        let c = chip(&mut eve);
        (c.elapsed_ms(), c.executed())
    };

    // More NOPs than the ring can hold at once. The simulated chip refuses
    // any append that would overrun its read pointer, so getting through at
    // all means the writer waited.
    for _ in 0..5000 {
        eve.nop().unwrap();
    }
    eve.wait_flush().unwrap();

    let c = chip(&mut eve);
    assert_eq!(c.executed() - executed, 5000);
    assert!(c.elapsed_ms() - elapsed >= 100);
    assert_eq!(c.rp(), c.wp());
    assert!(!eve.is_faulted());
}

#[test]
fn reconfigure_recovers_from_fault() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_fault_on(opcodes::SWAP, b"nope"));

    eve.swap().unwrap();
    // The flush inside configure sees the fault; the read pointer then
    // tells configure to reset.
    eve.configure(&DisplayConfig::compute(1024, 600, 60, FREQ))
        .unwrap();
    assert_eq!(eve.state(), DeviceState::Ready);
    assert!(!eve.is_faulted());
    assert!(!chip(&mut eve).is_faulted());
    assert_eq!(eve.display_config().map(|c| c.width), Some(1024));
}

#[test]
fn failed_reset_without_fault_keeps_state() {
    let mut mem = Memory::new();
    let mut eve = ready(mem.chip().with_stuck_reset());

    // Configure left two flash commands behind, so the pointers can't
    // read back as zero.
    assert_ne!(chip(&mut eve).wp(), 0);
    assert_eq!(eve.reset_coprocessor(), Err(Error::VerificationFailed));
    assert!(!eve.is_faulted());
    assert_eq!(eve.state(), DeviceState::Ready);
}
