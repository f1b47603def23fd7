use super::vfs::{Attribute, AttributeGroup, AttributeOps};
use crate::core_led::state::{Mode, SharedState};
use crate::error::AttrError;
use log::debug;
use std::sync::Arc;

/// Directory the LED groups are published under.
pub const LED_KOBJECT_DIR: &str = "/sys/led";
pub const MODE_ATTR: &str = "mode";
pub const PERIOD_ATTR: &str = "blinkPeriod";
pub const ATTR_PERMS: u16 = 0o664;

pub fn group_name(pin: u32) -> String {
    format!("led{}", pin)
}

struct ModeAttr {
    state: SharedState,
}

impl AttributeOps for ModeAttr {
    fn show(&self) -> String {
        format!("{}\n", self.state.mode().as_str())
    }

    // Unknown tokens are dropped; the caller still sees the whole buffer
    // consumed.
    fn store(&self, buf: &[u8]) -> Result<usize, AttrError> {
        let token = buf.strip_suffix(b"\n").unwrap_or(buf);
        match std::str::from_utf8(token).ok().and_then(Mode::from_token) {
            Some(mode) => {
                debug!("mode -> {}", mode.as_str());
                self.state.set_mode(mode);
            }
            None => debug!("mode: ignoring {:?}", String::from_utf8_lossy(token)),
        }
        Ok(buf.len())
    }
}

/// Parsed `blinkPeriod` input: the run of decimal digits after any leading
/// whitespace. Whatever follows the digits is ignored. `None` means a number
/// too large to be a period, which is ignored like any other out-of-range
/// value.
pub fn parse_period(buf: &[u8]) -> Result<Option<u32>, AttrError> {
    let text = buf.trim_ascii_start();
    let digits = text.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(AttrError::InvalidInput(format!(
            "{:?} does not start with a decimal period",
            String::from_utf8_lossy(text.trim_ascii_end())
        )));
    }
    // ASCII digits only, so both conversions can only fail on overflow.
    Ok(std::str::from_utf8(&text[..digits])
        .ok()
        .and_then(|number| number.parse::<u32>().ok()))
}

struct PeriodAttr {
    state: SharedState,
}

impl AttributeOps for PeriodAttr {
    fn show(&self) -> String {
        format!("{}\n", self.state.period_ms())
    }

    fn store(&self, buf: &[u8]) -> Result<usize, AttrError> {
        match parse_period(buf)? {
            Some(period) if self.state.try_set_period(period) => {
                debug!("blinkPeriod -> {} ms", period);
            }
            _ => debug!("blinkPeriod: out of range, ignored"),
        }
        Ok(buf.len())
    }
}

/// The `led<pin>` group holding `mode` and `blinkPeriod`.
pub fn led_group(pin: u32, state: &SharedState) -> AttributeGroup {
    AttributeGroup {
        name: group_name(pin),
        attrs: vec![
            Attribute::new(
                PERIOD_ATTR,
                ATTR_PERMS,
                Arc::new(PeriodAttr {
                    state: Arc::clone(state),
                }),
            ),
            Attribute::new(
                MODE_ATTR,
                ATTR_PERMS,
                Arc::new(ModeAttr {
                    state: Arc::clone(state),
                }),
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::vfs::{GroupHandle, VirtualFs};
    use crate::core_led::state::LedState;

    fn setup() -> (Arc<VirtualFs>, GroupHandle, SharedState) {
        let fs = VirtualFs::new();
        let state = LedState::shared(1000);
        let handle = fs.publish_group(LED_KOBJECT_DIR, led_group(21, &state)).unwrap();
        (fs, handle, state)
    }

    const MODE: &str = "/sys/led/led21/mode";
    const PERIOD: &str = "/sys/led/led21/blinkPeriod";

    #[test]
    fn group_is_named_after_pin() {
        assert_eq!(group_name(21), "led21");
        assert_eq!(group_name(4_000_000_000), "led4000000000");
    }

    #[test]
    fn mode_defaults_to_flash() {
        let (fs, _h, _state) = setup();
        assert_eq!(fs.read(MODE).unwrap(), "flash\n");
    }

    #[test]
    fn mode_tokens_round_trip() {
        let (fs, _h, state) = setup();
        for token in ["on", "off", "flash"] {
            let input = format!("{}\n", token);
            assert_eq!(fs.write(MODE, input.as_bytes()).unwrap(), input.len());
            assert_eq!(fs.read(MODE).unwrap(), input);
        }
        assert_eq!(state.mode(), Mode::Flash);
    }

    #[test]
    fn mode_without_newline_is_accepted() {
        let (fs, _h, state) = setup();
        fs.write(MODE, b"on").unwrap();
        assert_eq!(state.mode(), Mode::On);
    }

    #[test]
    fn bad_mode_tokens_are_ignored_but_consumed() {
        let (fs, _h, state) = setup();
        fs.write(MODE, b"off\n").unwrap();
        for junk in [&b"o\n"[..], b"\n", b"onn\n", b"ON\n", b"flash \n", b"off\n\n", b"\xff\n"] {
            assert_eq!(fs.write(MODE, junk).unwrap(), junk.len());
            assert_eq!(state.mode(), Mode::Off, "input {:?}", junk);
        }
    }

    #[test]
    fn period_in_range_round_trips() {
        let (fs, _h, _state) = setup();
        for value in [2u32, 500, 9999, 10_000] {
            let input = format!("{}\n", value);
            assert_eq!(fs.write(PERIOD, input.as_bytes()).unwrap(), input.len());
            assert_eq!(fs.read(PERIOD).unwrap(), input);
        }
    }

    #[test]
    fn period_out_of_range_is_ignored() {
        let (fs, _h, state) = setup();
        fs.write(PERIOD, b"250\n").unwrap();
        for input in ["0\n", "1\n", "10001\n", "4294967295\n", "99999999999999\n"] {
            assert_eq!(fs.write(PERIOD, input.as_bytes()).unwrap(), input.len());
            assert_eq!(state.period_ms(), 250, "input {:?}", input);
        }
        assert_eq!(fs.read(PERIOD).unwrap(), "250\n");
    }

    #[test]
    fn period_without_leading_digit_is_rejected() {
        let (fs, _h, state) = setup();
        for input in ["abc\n", "-5\n", "\n", "ms250\n", "+7\n"] {
            let err = fs.write(PERIOD, input.as_bytes()).unwrap_err();
            assert_eq!(err.errno(), -libc::EINVAL, "input {:?}", input);
        }
        assert_eq!(state.period_ms(), 1000);
    }

    #[test]
    fn trailing_garbage_after_period_is_ignored() {
        let (fs, _h, state) = setup();
        assert_eq!(fs.write(PERIOD, b"250ms\n").unwrap(), 6);
        assert_eq!(state.period_ms(), 250);
        assert_eq!(fs.write(PERIOD, b"12ab\n").unwrap(), 5);
        assert_eq!(state.period_ms(), 12);
    }

    #[test]
    fn only_the_first_number_counts() {
        let (fs, _h, state) = setup();
        assert_eq!(fs.write(PERIOD, b"300 400\n").unwrap(), 8);
        assert_eq!(state.period_ms(), 300);

        // "1" is out of range; the 2 after it is never looked at.
        assert_eq!(fs.write(PERIOD, b"1 2\n").unwrap(), 4);
        assert_eq!(state.period_ms(), 300);
    }

    #[test]
    fn parse_period_takes_leading_digits() {
        assert_eq!(parse_period(b"  42 \n").unwrap(), Some(42));
        assert_eq!(parse_period(b"\t7x").unwrap(), Some(7));
        assert_eq!(parse_period(b"4294967296").unwrap(), None);
        assert_eq!(parse_period(b"99999999999999ms").unwrap(), None);
    }
}
