//! lpm-node firmware - nRF52840 sleep/wake orchestrator node.
//!
//! Execution layout:
//!
//! - `EGU1_SWI1` (P6): application tasks. Interrupt handlers for the
//!   buttons and charger, the suspend timer, the policy and the periodic
//!   time-keeping job.
//! - `EGU0_SWI0` (P7): the sleep worker. Preempts the idle loop but never
//!   the application tasks.
//! - Thread mode: the idle loop. Notifies the orchestrator whenever the
//!   higher priorities have nothing to do, then waits for an event.

#![no_std]
#![no_main]

use cortex_m::peripheral::SCB;
use cortex_m_rt::entry;
use defmt::{info, unwrap, warn};
use embassy_executor::InterruptExecutor;
use embassy_futures::select::{select3, Either3};
use embassy_nrf::gpio::{Input, Pin, Pull};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker, Timer};
use lpm::advice::{PERIODIC_JOB, SECURE_TRANSFER};
use lpm::config::{
    DIAG_HISTORY_DEPTH, LPM_CONFIG, POLICY_IDLE_TIMEOUT_SECS, POLICY_TICK_MS,
    TIMEKEEPING_JOB_MS, TIMEKEEPING_PERIOD_SECS,
};
use lpm::{
    BusyMask, DiagEvent, HistoryDiagnostics, LogDiagnostics, Lpm, OsSuspendPrimitive,
    SleepPolicy, SuspendError, SuspendMode, SystemClock, VetoFlags,
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

/// Busy-advice id of the charger input while its level settles.
const SUBSYSTEM_CHARGER: u8 = 0;

/// Charger detect line settling time.
const CHARGER_SETTLE: Duration = Duration::from_millis(50);

type Diag = (LogDiagnostics, &'static HistoryDiagnostics<DIAG_HISTORY_DEPTH>);
type Node = Lpm<SystemClock, &'static BusyMask, &'static VetoFlags<2>, Diag>;

static BUSY: BusyMask = BusyMask::new();
static VETOES: VetoFlags<2> = VetoFlags::new([PERIODIC_JOB, SECURE_TRANSFER]);
static HISTORY: HistoryDiagnostics<DIAG_HISTORY_DEPTH> = HistoryDiagnostics::new();
static LPM: Node = Lpm::new(
    LPM_CONFIG,
    SystemClock,
    &BUSY,
    &VETOES,
    (LogDiagnostics, &HISTORY),
);

/// User activity, consumed by the policy task.
static ACTIVITY: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Charger attached (`true`) or removed, consumed by the policy task.
static CHARGER: Signal<CriticalSectionRawMutex, bool> = Signal::new();

static EXECUTOR_APP: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_WORKER: InterruptExecutor = InterruptExecutor::new();

static SCB_CELL: StaticCell<SCB> = StaticCell::new();

#[interrupt]
unsafe fn EGU1_SWI1() {
    EXECUTOR_APP.on_interrupt()
}

#[interrupt]
unsafe fn EGU0_SWI0() {
    EXECUTOR_WORKER.on_interrupt()
}

// Suspend primitive

/// Puts the core to sleep with `WFI`.
///
/// `WFI` runs with interrupts masked: a pending interrupt makes it return
/// immediately, and the resume is committed before the waking interrupt
/// is serviced.
struct CortexSleep {
    scb: &'static mut SCB,
}

impl OsSuspendPrimitive for CortexSleep {
    fn suspend(&mut self, mode: SuspendMode) -> Result<(), SuspendError> {
        match mode {
            SuspendMode::DeepSleep => self.scb.set_sleepdeep(),
            SuspendMode::Standby => self.scb.clear_sleepdeep(),
        }

        let result = LPM.sleep_masked(|| {
            cortex_m::asm::dsb();
            cortex_m::asm::wfi();
        });

        self.scb.clear_sleepdeep();
        result
    }
}

// Tasks

#[embassy_executor::task]
async fn suspend_timer_task() {
    LPM.run_suspend_timer().await
}

#[embassy_executor::task]
async fn sleep_worker_task(primitive: CortexSleep) {
    LPM.run_sleep_worker_task(primitive).await
}

#[embassy_executor::task(pool_size = 2)]
async fn button_task(mut button: Input<'static>, name: &'static str) {
    loop {
        button.wait_for_falling_edge().await;
        let state = LPM.on_ioi();
        info!("{} pressed (state {:?})", name, state);
        ACTIVITY.signal(());
    }
}

#[embassy_executor::task]
async fn charger_task(mut detect: Input<'static>) {
    loop {
        detect.wait_for_any_edge().await;
        BUSY.set_busy(SUBSYSTEM_CHARGER);
        Timer::after(CHARGER_SETTLE).await;
        let plugged = detect.is_low();
        BUSY.clear_busy(SUBSYSTEM_CHARGER);

        info!("Charger {}", if plugged { "attached" } else { "removed" });
        LPM.on_long_ioi();
        CHARGER.signal(plugged);
    }
}

#[embassy_executor::task]
async fn policy_task() {
    let mut policy = SleepPolicy::new(
        Instant::now(),
        Duration::from_secs(POLICY_IDLE_TIMEOUT_SECS),
    );
    let mut ticker = Ticker::every(Duration::from_millis(POLICY_TICK_MS));

    loop {
        let event = select3(ticker.next(), ACTIVITY.wait(), CHARGER.wait()).await;
        let now = Instant::now();
        let command = match event {
            Either3::First(()) => policy.tick(now),
            Either3::Second(()) => policy.activity(now),
            Either3::Third(plugged) => {
                let woken = policy.activity(now);
                policy.set_external_power(now, plugged).or(woken)
            }
        };
        if let Some(command) = command {
            let state = command.apply(&LPM);
            info!("Policy {:?} -> {:?}", command, state);
        }
    }
}

#[embassy_executor::task]
async fn timekeeping_task() {
    let mut ticker = Ticker::every(Duration::from_secs(TIMEKEEPING_PERIOD_SECS));

    loop {
        ticker.next().await;
        VETOES.set(PERIODIC_JOB, true);
        // Let the RTC settle before sampling; sleep stays vetoed meanwhile.
        Timer::after(Duration::from_millis(TIMEKEEPING_JOB_MS)).await;

        let illegal = HISTORY.count(|e| matches!(e, DiagEvent::IllegalTransition { .. }));
        info!(
            "Uptime {}s, state {:?}, {} illegal transitions in history",
            Instant::now().as_secs(),
            LPM.current_state(),
            illegal
        );
        if let Some(last) = HISTORY.last() {
            info!("Last event: {:?}", last);
        }

        VETOES.set(PERIODIC_JOB, false);
        if let Some(state) = LPM.periodic_jobs_finished() {
            info!("Time-keeping released sleep ({:?})", state);
        }
    }
}

// Entry point

#[entry]
fn main() -> ! {
    info!("lpm-node starting");

    if let Err(e) = LPM.config().validate() {
        warn!("Invalid LPM configuration: {}", e);
    }

    let p = embassy_nrf::init(Default::default());
    let core = unwrap!(cortex_m::Peripherals::take());
    let scb = SCB_CELL.init(core.SCB);

    interrupt::EGU1_SWI1.set_priority(Priority::P6);
    let app = EXECUTOR_APP.start(interrupt::EGU1_SWI1);
    unwrap!(app.spawn(suspend_timer_task()));
    unwrap!(app.spawn(button_task(
        Input::new(p.P0_11.degrade(), Pull::Up),
        "button-1"
    )));
    unwrap!(app.spawn(button_task(
        Input::new(p.P0_12.degrade(), Pull::Up),
        "button-2"
    )));
    unwrap!(app.spawn(charger_task(Input::new(p.P0_24.degrade(), Pull::Up))));
    unwrap!(app.spawn(policy_task()));
    unwrap!(app.spawn(timekeeping_task()));

    interrupt::EGU0_SWI0.set_priority(Priority::P7);
    let worker = EXECUTOR_WORKER.start(interrupt::EGU0_SWI0);
    unwrap!(worker.spawn(sleep_worker_task(CortexSleep { scb })));

    info!("All tasks spawned, entering idle loop");

    loop {
        if !LPM.idle_tick() {
            cortex_m::asm::wfe();
        }
    }
}
