#![no_main]
#![no_std]

use gps_clock as _;
use gps_clock::{
    calendar::DateTime,
    config,
    drivers::{self, ds3231::RtcSync, At24c32, Ds3231, Pcf8574},
    dump,
    nmea::NmeaParser,
    rb::{Consumer, Producer, Ringbuf},
    Position,
};

use chrono::{DateTime as ChronoDateTime, Utc};
use defmt::{debug, error, info, trace, warn, Debug2Format};
use rtic_monotonics::{create_systick_token, systick::Systick};
use rtic_sync::{
    channel::{Receiver, Sender},
    make_channel,
};
use stm32l4xx_hal::{
    gpio::{Alternate, OpenDrain, PushPull, PA2, PA3, PB6, PB7},
    i2c::{self, I2c},
    pac::{I2C1, LPUART1},
    prelude::*,
    rcc::{ClockSecuritySystem, CrystalBypass},
    serial::{self, Config, Serial},
};

type LpUart1 = Serial<LPUART1, (PA2<Alternate<PushPull, 8>>, PA3<Alternate<PushPull, 8>>)>;

type I2c1 = I2c<I2C1, (PB6<Alternate<OpenDrain, 4>>, PB7<Alternate<OpenDrain, 4>>)>;

const UART_RX_BUFSIZE: usize = config::UART_RX_BUFSIZE;

struct UartStuff {
    uart: LpUart1,
    rx_send: Producer<u8, UART_RX_BUFSIZE>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ClockEvent {
    /// GPS time confirmed, RTC already within tolerance
    GpsTime,
    /// GPS time confirmed and written to the RTC
    RtcSynced,
    Position,
}

/// Bus bring-up: map the bus, exercise the EEPROM and the keypad expander,
/// then hand the bus to the RTC.
fn self_test(mut bus: I2c1) -> Ds3231<I2c1> {
    let found = drivers::scan(&mut bus);
    dump::scan_map(found, |line| info!("{=str}", line));

    let mut eeprom = At24c32::with_address(bus, config::EEPROM_ADDRESS);
    if eeprom.probe() {
        info!("EEPROM OK");
        let pattern = b"gps-clock";
        let written = pattern
            .iter()
            .zip(0_u16..)
            .try_for_each(|(&b, addr)| eeprom.write_byte(addr, b));
        let sum = eeprom.checksum();
        eeprom.clear_checksum();
        let dumped = dump::memdump(&mut eeprom, 0, config::EEPROM_TEST_LEN, |line| {
            info!("{=str}", line)
        });
        match written.and(dumped) {
            Ok(()) => info!("EEPROM checksum write {=u8:x} read {=u8:x}", sum, eeprom.checksum()),
            Err(e) => error!("EEPROM test failed: {}", Debug2Format(&e)),
        }
    } else {
        warn!("EEPROM missing");
    }

    let mut keypad = Pcf8574::with_address(eeprom.release(), config::KEYPAD_ADDRESS);
    if keypad.probe() {
        info!("PCF8574 OK");
        match keypad.char_key_4x4() {
            Ok(Some(key)) => info!("key held: {=char}", key),
            Ok(None) => (),
            Err(e) => error!("keypad scan failed: {}", Debug2Format(&e)),
        }
    } else {
        warn!("PCF8574 missing");
    }

    let mut rtc = Ds3231::with_address(keypad.release(), config::RTC_ADDRESS);
    if rtc.probe() {
        info!("RTC OK");
        match rtc.oscillator_ok() {
            Ok(true) => (),
            Ok(false) => warn!("RTC oscillator stopped, time is invalid until GPS fix"),
            Err(e) => error!("RTC status read failed: {}", Debug2Format(&e)),
        }
        if let Ok(t) = rtc.temperature() {
            info!("RTC temperature {=f32} C", t);
        }
    } else {
        error!("RTC missing");
    }
    rtc
}

#[rtic::app(
    device = stm32l4xx_hal::pac,
    dispatchers = [EXTI2, EXTI3],
)]
mod app {
    use super::*;

    // Shared resources go here
    #[shared]
    struct Shared {
        rtc: Ds3231<I2c1>,
        position: Position,
        time: ChronoDateTime<Utc>,
    }

    // Local resources go here
    #[local]
    struct Local {
        uart: UartStuff,
    }

    ////////////////////////////////////////////////////////////////////////////
    // Main thread tasks ///////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        trace!("init enter");

        let mut flash = cx.device.FLASH.constrain();
        let mut rcc = cx.device.RCC.constrain();
        let mut pwr = cx.device.PWR.constrain(&mut rcc.apb1r1);
        let clocks = rcc
            .cfgr
            .lse(CrystalBypass::Disable, ClockSecuritySystem::Disable)
            .freeze(&mut flash.acr, &mut pwr);

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.ahb2);
        let mut gpiob = cx.device.GPIOB.split(&mut rcc.ahb2);

        // Create SysTick monotonic for task scheduling
        Systick::start(cx.core.SYST, clocks.sysclk().raw(), create_systick_token!());

        // Initialize I2C for the RTC, EEPROM and keypad
        let scl = gpiob
            .pb6
            .into_alternate_open_drain(&mut gpiob.moder, &mut gpiob.otyper, &mut gpiob.afrl);
        let sda = gpiob
            .pb7
            .into_alternate_open_drain(&mut gpiob.moder, &mut gpiob.otyper, &mut gpiob.afrl);
        let bus = I2c::i2c1(
            cx.device.I2C1,
            (scl, sda),
            i2c::Config::new(config::I2C_FREQUENCY_KHZ.kHz(), clocks),
            &mut rcc.apb1r1,
        );
        let rtc = self_test(bus);

        // Initialize UART for GPS
        let tx = gpioa
            .pa2
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);
        let rx = gpioa
            .pa3
            .into_alternate(&mut gpioa.moder, &mut gpioa.otyper, &mut gpioa.afrl);

        let mut uart = Serial::lpuart1(
            cx.device.LPUART1,
            (tx, rx),
            Config::default().baudrate(config::GPS_BAUD_RATE.bps()),
            clocks,
            &mut rcc.apb1r2,
        );
        uart.listen(serial::Event::Rxne);

        // Create channels for communicating between tasks and the UART interrupt
        static UART_RX: Ringbuf<u8, UART_RX_BUFSIZE> = Ringbuf::new();
        let (uart_rx_send, uart_rx_recv) = UART_RX.try_split().unwrap();

        let uart = UartStuff {
            uart,
            rx_send: uart_rx_send,
        };

        let (clock_event_tx, clock_event_rx) = make_channel!(ClockEvent, 4);

        // Spawn tasks
        clock_task::spawn(clock_event_rx).map_err(|_| ()).unwrap();
        gps_task::spawn(uart_rx_recv, clock_event_tx)
            .map_err(|_| ())
            .unwrap();

        info!("done initializing!");
        trace!("init exit");
        (
            Shared {
                rtc,
                position: Position::default(),
                time: ChronoDateTime::default(),
            },
            Local { uart },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        trace!("idle enter");

        loop {
            // Only sleep in release mode, since the debugger doesn't interact with sleep very nicely
            #[cfg(debug_assertions)]
            cortex_m::asm::nop();
            #[cfg(not(debug_assertions))]
            cortex_m::asm::wfi();
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Hardware interrupt handlers /////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Move received GPS bytes into the buffer
    #[task(binds = LPUART1, priority = 10, local = [uart])]
    fn on_uart(cx: on_uart::Context) {
        match cx.local.uart.uart.read() {
            // If the recv buffer is full, then drop the received value
            Ok(b) => {
                let _ = cx.local.uart.rx_send.try_write(b);
            }
            Err(nb::Error::WouldBlock) => (),
            Err(nb::Error::Other(e)) => debug!("UART error: {}", Debug2Format(&e)),
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Async tasks /////////////////////////////////////////////////////////////
    ////////////////////////////////////////////////////////////////////////////

    // Decode GPS sentences and keep the RTC in step with them
    #[task(priority = 2, shared = [rtc, position, time])]
    async fn gps_task(
        mut cx: gps_task::Context,
        uart_rx_recv: Consumer<u8, UART_RX_BUFSIZE>,
        mut events: Sender<'static, ClockEvent, 4>,
    ) {
        trace!("gps_task enter");

        let mut parser = NmeaParser::new();
        loop {
            let Some(fix) = parser.process_byte(uart_rx_recv.async_read().await) else {
                continue;
            };
            debug!("fix {}", fix);

            if parser.is_valid_position() {
                let pos = fix.position();
                let changed = cx.shared.position.lock(|p| {
                    let changed = *p != pos;
                    *p = pos;
                    changed
                });
                if changed {
                    let _ = events.try_send(ClockEvent::Position);
                }
            }

            if parser.is_valid_time() {
                let gps_time = fix.datetime();
                if let Some(utc) = fix.datetime_utc() {
                    cx.shared.time.lock(|t| *t = utc);
                }

                let synced = cx
                    .shared
                    .rtc
                    .lock(|rtc| rtc.sync_to(&gps_time, config::RTC_MAX_DRIFT));
                match synced {
                    Ok(RtcSync::Updated) => {
                        let _ = events.send(ClockEvent::RtcSynced).await;
                    }
                    Ok(RtcSync::InStep) => {
                        let _ = events.try_send(ClockEvent::GpsTime);
                    }
                    Ok(RtcSync::Rejected) => (),
                    Err(e) => error!("RTC update failed: {}", Debug2Format(&e)),
                }
                parser.reset_valid_time();
            }
        }
    }

    // Print local time from the RTC once a second
    #[task(priority = 1, shared = [rtc, position, time])]
    async fn clock_task(
        mut cx: clock_task::Context,
        mut events: Receiver<'static, ClockEvent, 4>,
    ) {
        loop {
            while let Ok(event) = events.try_recv() {
                debug!("clock_task got event {}", event);
                match event {
                    ClockEvent::Position => {
                        let pos = cx.shared.position.lock(|p| *p);
                        info!("{=str}", dump::position_line(&pos).as_str().unwrap_or(""));
                    }
                    ClockEvent::RtcSynced => {
                        let utc = cx.shared.time.lock(|t| *t);
                        info!("RTC set from GPS: {}", Debug2Format(&utc));
                    }
                    ClockEvent::GpsTime => (),
                }
            }

            match cx.shared.rtc.lock(|rtc| rtc.datetime()) {
                Ok(utc) => {
                    let local = config::LOCAL_TIME_ZONE.local_time(utc.unix_time());
                    let local = DateTime::from_unix_time(local);
                    info!("{=str}", dump::datetime_line(&local).as_str().unwrap_or(""));
                }
                Err(e) => error!("RTC read failed: {}", Debug2Format(&e)),
            }

            Systick::delay(1.secs()).await;
        }
    }
}
