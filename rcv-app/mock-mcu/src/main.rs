use std::convert::Infallible;
use std::path::PathBuf;

use clap::Parser;
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embassy_time::{Delay, Duration, Instant, Timer};
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use rcv_core::mk_static;
use rcv_core::utils::{
    VehicleConfig, VehicleController, wss,
    controllers::{Actuators, BatteryMonitor, SystemClock, VoltageSampler},
    math::drive::DriveOutput,
};
use static_cell::StaticCell;
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// HTTP/WebSocket port
    #[clap(long, default_value_t = 8000)]
    port: u16,
    /// JSON file overriding vehicle tunables
    #[clap(long)]
    config: Option<PathBuf>,
}

/// Actuators that log every write instead of driving pins.
struct LoggingActuators;

impl Actuators for LoggingActuators {
    type Error = Infallible;

    fn set_steering(&mut self, angle: u8) -> Result<(), Infallible> {
        info!(angle, "steering");
        Ok(())
    }

    fn set_drive(&mut self, drive: DriveOutput) -> Result<(), Infallible> {
        let (forward, backward) = drive.duties();
        info!(forward, backward, "drive");
        Ok(())
    }

    fn set_headlight(&mut self, level: u8) -> Result<(), Infallible> {
        info!(level, "headlight");
        Ok(())
    }

    fn set_taillight(&mut self, level: u8) -> Result<(), Infallible> {
        info!(level, "taillight");
        Ok(())
    }
}

/// Pack that starts full and loses one raw count every ten seconds.
struct DrainingPack {
    started: Instant,
}

impl VoltageSampler for DrainingPack {
    type Error = Infallible;

    fn sample(&mut self) -> Result<u16, Infallible> {
        let drained = (self.started.elapsed().as_secs() / 10).min(700) as u16;
        Ok(1400 - drained)
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn control_task(mut ctrl: VehicleController<LoggingActuators>) -> ! {
    ctrl.run(&SystemClock, &mut Delay).await
}

#[embassy_executor::task]
async fn battery_task(mut monitor: BatteryMonitor<DrainingPack, Delay>) -> ! {
    loop {
        if let Err(e) = monitor.refresh() {
            error!("battery read failed: {:?}", e);
        }
        Timer::after(Duration::from_secs(1)).await;
    }
}

fn load_config(path: Option<&PathBuf>) -> VehicleConfig {
    let Some(path) = path else {
        return VehicleConfig::default();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => match VehicleConfig::from_json(&text) {
            Ok(cfg) => {
                info!(?path, "loaded vehicle config");
                cfg
            }
            Err(e) => {
                warn!(?path, "invalid vehicle config, using defaults: {}", e);
                VehicleConfig::default()
            }
        },
        Err(e) => {
            warn!(?path, "cannot read vehicle config, using defaults: {}", e);
            VehicleConfig::default()
        }
    }
}

async fn wait_for_network(stack: Stack<'static>) {
    info!("Waiting for network link...");
    stack.wait_link_up().await;
    info!("Waiting to get IP address...");
    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("Got IP: {}", config.address);
    }
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner, opts: Opts) {
    let vehicle_config = load_config(opts.config.as_ref());
    let ctrl = VehicleController::new(LoggingActuators, vehicle_config, Instant::now());
    spawner.spawn(control_task(ctrl)).unwrap();

    let mut monitor = BatteryMonitor::new(
        DrainingPack {
            started: Instant::now(),
        },
        Delay,
    );
    // `/vin` has a reading before the server accepts requests.
    if let Err(e) = monitor.refresh() {
        error!("initial battery read failed: {:?}", e);
    }
    spawner.spawn(battery_task(monitor)).unwrap();

    // Network on a TAP device
    let device = TunTapDevice::new(&opts.tap).unwrap();
    let config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    OsRng.try_fill_bytes(&mut seed_buf).unwrap();
    let seed = u64::from_le_bytes(seed_buf);

    let (stack, runner) = embassy_net::new(
        device,
        config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    wait_for_network(stack).await;

    info!("Starting WebSocket server on port {}", opts.port);
    wss(0, opts.port, stack, None).await;
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}
