// A small test bed for trying out the library crates in practice. There's
// no hardware adapter wired in yet, so it drives the simulated chip from
// bteve::interface::fake, which is still enough to watch the boot sequence,
// the FIFO protocol and fault recovery go by with RUST_LOG=debug.

use anyhow::{anyhow, bail, Context};
use bteve::commands::opcodes;
use bteve::interface::fake::{self, BootScript};
use bteve::memory::region::MemoryRegion;
use bteve::models::bt820::BT820;
use bteve::models::Model;
use bteve::registers::Register;
use bteve::{BootParameters, DisplayConfig, DisplayPreset, EVE};
use clap::{Parser, ValueEnum};

type Device<'a> = EVE<BT820, fake::Interface<'a, BT820>>;

#[derive(Parser)]
#[command(name = "bteve")]
#[command(about = "Boot and configure a simulated BT82x, then exercise its command FIFO", long_about = None)]
#[command(version)]
struct Cli {
    /// Display width in pixels
    #[arg(long, default_value = "1920", value_parser = clap::value_parser!(u32).range(1..=bteve::config::MAX_DIMENSION as i64))]
    width: u32,

    /// Display height in pixels
    #[arg(long, default_value = "1200", value_parser = clap::value_parser!(u32).range(1..=bteve::config::MAX_DIMENSION as i64))]
    height: u32,

    /// Target refresh rate in Hz
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=240))]
    refresh: u32,

    /// Use known timings for a display instead of computing them
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Number of boot status polls before the simulated chip reports ready
    #[arg(long, default_value = "3")]
    boot_delay: u32,

    /// Make the coprocessor fault on a display list swap, then recover
    #[arg(long)]
    fault: bool,

    /// Length of the test pattern to checksum in main memory
    #[arg(long, default_value = "4096")]
    crc_len: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Fhd,
    Wuxga,
}

impl From<Preset> for DisplayPreset {
    fn from(p: Preset) -> Self {
        match p {
            Preset::Fhd => DisplayPreset::FHD,
            Preset::Wuxga => DisplayPreset::WUXGA,
        }
    }
}

fn eve_err<E: core::fmt::Debug>(err: bteve::Error<E>) -> anyhow::Error {
    anyhow!("{}", err)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if cli.crc_len == 0 {
        bail!("--crc-len must be at least one byte");
    }

    let mut main_ram = vec![0u8; (cli.crc_len as usize).max(64 * 1024)];
    let mut dl_ram = vec![0u8; 16 * 1024];
    let mut cmd_ram = vec![0u8; 16 * 1024];

    let mut chip = fake::Interface::new(BT820)
        .with_main_ram(&mut main_ram)
        .with_display_list_ram(&mut dl_ram)
        .with_cmd_ram(&mut cmd_ram)
        .with_consume_delay(2)
        .with_boot_script(BootScript {
            boot_status_polls: cli.boot_delay,
            engine_busy_polls: 2,
            ..BootScript::default()
        });
    if cli.fault {
        chip = chip.with_fault_on(opcodes::SWAP, b"display list swap refused");
    }

    let mut eve: Device = EVE::new(chip);
    bring_up(&mut eve, &cli)?;
    checksum(&mut eve, cli.crc_len)?;
    if cli.fault {
        fault_and_recover(&mut eve)?;
    }

    let (polls, elapsed) = {
        let chip = eve.low_level().borrow_interface();
        (chip.polls(), chip.elapsed_ms())
    };
    println!("{} FIFO polls, {}ms of simulated sleeping", polls, elapsed);
    eve.shutdown().map_err(eve_err).context("shutdown failed")?;
    Ok(())
}

fn bring_up(eve: &mut Device, cli: &Cli) -> anyhow::Result<()> {
    let params = BootParameters::default();
    match cli.preset {
        Some(preset) => eve
            .boot_and_configure(&params, preset.into())
            .map_err(eve_err)
            .context("bring-up failed")?,
        None => {
            eve.boot(&params).map_err(eve_err).context("boot failed")?;
            let freq = eve
                .low_level()
                .rd32(BT820::reg_ptr(Register::FREQUENCY))
                .map_err(|err| anyhow!("{:?}", err))?;
            let config = DisplayConfig::compute(cli.width, cli.height, cli.refresh, freq);
            eve.configure(&config)
                .map_err(eve_err)
                .context("configure failed")?;
        }
    }

    println!("chip id {:#07x}, {} MiB of RAM", eve.chip_id(), eve.ram_size() >> 20);
    if let Some(config) = eve.display_config() {
        let freq = BootScript::default().frequency;
        println!(
            "{}x{} pclk/{} horiz {:?} vert {:?}, {}Hz",
            config.width,
            config.height,
            config.pclk,
            config.horiz,
            config.vert,
            config.refresh_rate(freq)
        );
    }
    Ok(())
}

fn checksum(eve: &mut Device, len: u32) -> anyhow::Result<()> {
    let pattern: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
    let start = <<BT820 as Model>::MainMem as MemoryRegion>::ptr(0);
    {
        // Straight into memory over the link, since the pattern may be
        // longer than the command FIFO.
        let ll = eve.low_level();
        ll.wr8s(start, &pattern).map_err(|err| anyhow!("{:?}", err))?;
        ll.flush().map_err(|err| anyhow!("{:?}", err))?;
    }
    let crc = eve.mem_crc(start..(start + len)).map_err(eve_err)?;
    let want = fake::crc32(&pattern);
    println!("CRC-32 of {} bytes: {:#010x}", len, crc);
    if crc != want {
        bail!("coprocessor CRC {:#010x} doesn't match {:#010x}", crc, want);
    }
    Ok(())
}

fn fault_and_recover(eve: &mut Device) -> anyhow::Result<()> {
    eve.dl_start().map_err(eve_err)?;
    eve.swap().map_err(eve_err)?;
    match eve.wait_flush() {
        Err(bteve::Error::Fault) => {}
        Err(err) => return Err(eve_err(err)),
        Ok(()) => bail!("expected the coprocessor to fault"),
    }
    let msg = eve.coprocessor_fault_msg().map_err(eve_err)?;
    println!(
        "coprocessor fault: {}",
        msg.as_str().unwrap_or("(not text)")
    );

    eve.low_level().borrow_interface().clear_fault_trigger();
    eve.reset_coprocessor()
        .map_err(eve_err)
        .context("coprocessor reset failed")?;
    eve.dl_start().map_err(eve_err)?;
    eve.swap().map_err(eve_err)?;
    eve.wait_flush().map_err(eve_err)?;
    println!("recovered, state {:?}", eve.state());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_oversize_dimensions() {
        assert!(Cli::try_parse_from(["bteve", "--width", "0"]).is_err());
        assert!(Cli::try_parse_from(["bteve", "--height", "0"]).is_err());
        assert!(Cli::try_parse_from(["bteve", "--width", "2048"]).is_err());
        assert!(Cli::try_parse_from(["bteve", "--refresh", "0"]).is_err());

        let cli = Cli::try_parse_from(["bteve", "--width", "2047", "--height", "1"]).unwrap();
        assert_eq!((cli.width, cli.height), (2047, 1));
    }
}
