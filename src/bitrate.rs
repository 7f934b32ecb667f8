//! Bit rate configuration for the three channel generations.
//!
//! Classic channels take a 16-bit BTR0BTR1 register code. FD and XL channels
//! take a `key=value,key=value` descriptor that is parsed and validated here
//! so that a malformed descriptor never reaches the driver.

use crate::error::{CanError, Result};
use crate::message::Generation;
use crate::parameter::encode_text;
use crate::types::Config;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::str::FromStr;

/// Named BTR0BTR1 codes for classic channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Baudrate {
    Baud1M = 0x0014,
    Baud800K = 0x0016,
    Baud500K = 0x001C,
    Baud250K = 0x011C,
    Baud125K = 0x031C,
    Baud100K = 0x432F,
    Baud95K = 0xC34E,
    Baud83K = 0x852B,
    Baud50K = 0x472F,
    Baud47K = 0x1414,
    Baud33K = 0x8B2F,
    Baud20K = 0x532F,
    Baud10K = 0x672F,
    Baud5K = 0x7F7F,
}

impl Baudrate {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Nominal bit rate in bit/s.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Baudrate::Baud1M => 1_000_000,
            Baudrate::Baud800K => 800_000,
            Baudrate::Baud500K => 500_000,
            Baudrate::Baud250K => 250_000,
            Baudrate::Baud125K => 125_000,
            Baudrate::Baud100K => 100_000,
            Baudrate::Baud95K => 95_238,
            Baudrate::Baud83K => 83_333,
            Baudrate::Baud50K => 50_000,
            Baudrate::Baud47K => 47_619,
            Baudrate::Baud33K => 33_333,
            Baudrate::Baud20K => 20_000,
            Baudrate::Baud10K => 10_000,
            Baudrate::Baud5K => 5_000,
        }
    }
}

/// Controller clock, given either in Hz or in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clock {
    Hz(u32),
    MHz(u32),
}

impl Clock {
    pub fn hz(self) -> u64 {
        match self {
            Clock::Hz(hz) => u64::from(hz),
            Clock::MHz(mhz) => u64::from(mhz) * 1_000_000,
        }
    }

    fn write(self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clock::Hz(hz) => write!(f, "f_clock={hz}"),
            Clock::MHz(mhz) => write!(f, "f_clock_mhz={mhz}"),
        }
    }
}

/// Parsed `key=value` pairs, consumed key by key.
struct Fields {
    pairs: Vec<(String, u32)>,
}

impl Fields {
    fn parse(descriptor: &str, aliases: &[(&str, &str)]) -> Result<Self> {
        let mut pairs: Vec<(String, u32)> = Vec::new();
        for pair in descriptor.split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CanError::Bitrate(format!("expected key=value, got {pair:?}")))?;
            let mut key = key.trim().to_ascii_lowercase();
            if let Some((_, canonical)) = aliases.iter().find(|(alias, _)| *alias == key) {
                key = canonical.to_string();
            }
            let value = value.trim();
            if value.is_empty() {
                return Err(CanError::Bitrate(format!("{key} has no value")));
            }
            let value = value
                .parse()
                .map_err(|_| CanError::Bitrate(format!("{key}={value} is not a number")))?;
            if pairs.iter().any(|(existing, _)| *existing == key) {
                return Err(CanError::Bitrate(format!("{key} given twice")));
            }
            pairs.push((key, value));
        }
        Ok(Self { pairs })
    }

    fn take(&mut self, key: &str) -> Option<u32> {
        let index = self.pairs.iter().position(|(existing, _)| existing == key)?;
        Some(self.pairs.swap_remove(index).1)
    }

    fn require(&mut self, key: &str) -> Result<u32> {
        self.take(key)
            .ok_or_else(|| CanError::Bitrate(format!("missing {key}")))
    }

    fn clock(&mut self) -> Result<Clock> {
        match (self.take("f_clock"), self.take("f_clock_mhz")) {
            (Some(hz), None) => Ok(Clock::Hz(hz)),
            (None, Some(mhz)) => Ok(Clock::MHz(mhz)),
            (Some(_), Some(_)) => Err(CanError::Bitrate(
                "f_clock and f_clock_mhz are exclusive".to_string(),
            )),
            (None, None) => Err(CanError::Bitrate("missing f_clock".to_string())),
        }
    }

    fn flag(&mut self, key: &str) -> Result<bool> {
        match self.take(key) {
            None | Some(0) => Ok(false),
            Some(1) => Ok(true),
            Some(other) => Err(CanError::Bitrate(format!("{key}={other} is not 0 or 1"))),
        }
    }

    fn finish(self) -> Result<()> {
        match self.pairs.first() {
            Some((key, _)) => Err(CanError::Bitrate(format!("unknown key {key}"))),
            None => Ok(()),
        }
    }
}

/// Segment timing of one bit rate phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segments {
    pub tseg1: u32,
    pub tseg2: u32,
    pub sjw: u32,
}

impl Segments {
    pub fn new(tseg1: u32, tseg2: u32, sjw: u32) -> Self {
        Self { tseg1, tseg2, sjw }
    }

    /// Time quanta per bit, sync segment included.
    pub fn quanta(&self) -> u32 {
        1 + self.tseg1 + self.tseg2
    }

    fn validate(&self, phase: &str) -> Result<()> {
        if self.tseg1 == 0 || self.tseg2 == 0 || self.sjw == 0 {
            return Err(CanError::Bitrate(format!(
                "{phase} segments must be non-zero"
            )));
        }
        if self.sjw > self.tseg2 {
            return Err(CanError::Bitrate(format!(
                "{phase} sjw {} exceeds tseg2 {}",
                self.sjw, self.tseg2
            )));
        }
        Ok(())
    }
}

fn bitrate_of(clock: Clock, brp: u32, segments: &Segments) -> u32 {
    let divisor = u64::from(brp) * u64::from(segments.quanta());
    if divisor == 0 {
        return 0;
    }
    u32::try_from(clock.hz() / divisor).unwrap_or(u32::MAX)
}

/// Standard CAN FD bit rate profiles, 80 MHz clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdProfile {
    Rate250k1m,
    Rate500k2m,
    Rate500k4m,
    Rate1m4m,
    Rate1m8m,
}

/// CAN FD bit rate descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitrateFd {
    pub clock: Clock,
    pub nom_brp: u32,
    pub nominal: Segments,
    /// Sample count of the nominal phase
    pub nom_sam: Option<u32>,
    pub data_brp: u32,
    pub data: Segments,
    /// Secondary sample point offset
    pub data_ssp_offset: Option<u32>,
}

impl BitrateFd {
    /// Older spelling of the `data_ssp_offset` key.
    ///
    /// Accepted by [`BitrateFd::parse`] as a host-side convenience only; the
    /// driver knows just `data_ssp_offset`, which is what [`fmt::Display`]
    /// writes.
    pub const DATA_SAMPLE: &'static str = "data_sample";

    pub fn preset(profile: FdProfile) -> Self {
        let (nom_brp, data_brp) = match profile {
            FdProfile::Rate250k1m => (20, 8),
            FdProfile::Rate500k2m => (10, 4),
            FdProfile::Rate500k4m => (10, 2),
            FdProfile::Rate1m4m => (5, 2),
            FdProfile::Rate1m8m => (5, 1),
        };
        Self {
            clock: Clock::MHz(80),
            nom_brp,
            nominal: Segments::new(12, 3, 1),
            nom_sam: None,
            data_brp,
            data: Segments::new(7, 2, 1),
            data_ssp_offset: None,
        }
    }

    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut fields = Fields::parse(descriptor, &[(Self::DATA_SAMPLE, "data_ssp_offset")])?;
        let bitrate = Self {
            clock: fields.clock()?,
            nom_brp: fields.require("nom_brp")?,
            nominal: Segments::new(
                fields.require("nom_tseg1")?,
                fields.require("nom_tseg2")?,
                fields.require("nom_sjw")?,
            ),
            nom_sam: fields.take("nom_sam"),
            data_brp: fields.require("data_brp")?,
            data: Segments::new(
                fields.require("data_tseg1")?,
                fields.require("data_tseg2")?,
                fields.require("data_sjw")?,
            ),
            data_ssp_offset: fields.take("data_ssp_offset"),
        };
        fields.finish()?;
        bitrate.validate()?;
        Ok(bitrate)
    }

    pub fn nominal_bitrate(&self) -> u32 {
        bitrate_of(self.clock, self.nom_brp, &self.nominal)
    }

    pub fn data_bitrate(&self) -> u32 {
        bitrate_of(self.clock, self.data_brp, &self.data)
    }
}

impl Config for BitrateFd {
    fn validate(&self) -> Result<()> {
        if self.clock.hz() == 0 {
            return Err(CanError::Bitrate("clock must be non-zero".to_string()));
        }
        if self.nom_brp == 0 || self.data_brp == 0 {
            return Err(CanError::Bitrate("prescalers must be non-zero".to_string()));
        }
        self.nominal.validate("nominal")?;
        self.data.validate("data")
    }
}

impl fmt::Display for BitrateFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.clock.write(f)?;
        write!(
            f,
            ",nom_brp={},nom_tseg1={},nom_tseg2={},nom_sjw={}",
            self.nom_brp, self.nominal.tseg1, self.nominal.tseg2, self.nominal.sjw
        )?;
        if let Some(sam) = self.nom_sam {
            write!(f, ",nom_sam={sam}")?;
        }
        write!(
            f,
            ",data_brp={},data_tseg1={},data_tseg2={},data_sjw={}",
            self.data_brp, self.data.tseg1, self.data.tseg2, self.data.sjw
        )?;
        if let Some(offset) = self.data_ssp_offset {
            write!(f, ",data_ssp_offset={offset}")?;
        }
        Ok(())
    }
}

impl FromStr for BitrateFd {
    type Err = CanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// PWM symbol timing used in transceiver mode switching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pwm {
    pub offset: Option<u32>,
    pub short: Option<u32>,
    pub long: Option<u32>,
}

/// CAN XL bit rate descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitrateXl {
    pub clock: Clock,
    /// Prescaler shared by the nominal, FD and XL phases
    pub brp: u32,
    /// Nominal prescaler, passed through to the driver when given
    pub nom_brp: Option<u32>,
    pub nominal: Segments,
    /// FD data phase; required when error signaling is on
    pub fd: Option<Segments>,
    pub fd_ssp_offset: Option<u32>,
    /// XL data phase; required when transceiver mode switching is on
    pub xl: Option<Segments>,
    pub xl_ssp_offset: Option<u32>,
    pub pwm: Pwm,
    pub transceiver_mode_switch: bool,
    pub error_signaling: bool,
}

impl BitrateXl {
    /// Short name of the `xl_error_signaling` key
    pub const ERROR_SIGNALING: &'static str = "error_signaling";

    /// Nominal phase only, no FD or XL data phase.
    pub fn new(clock: Clock, brp: u32, nominal: Segments) -> Self {
        Self {
            clock,
            brp,
            nom_brp: None,
            nominal,
            fd: None,
            fd_ssp_offset: None,
            xl: None,
            xl_ssp_offset: None,
            pwm: Pwm::default(),
            transceiver_mode_switch: false,
            error_signaling: false,
        }
    }

    /// Enables transceiver mode switching with the given XL data phase.
    pub fn with_xl_phase(mut self, xl: Segments) -> Self {
        self.xl = Some(xl);
        self.transceiver_mode_switch = true;
        self
    }

    /// Enables error signaling with the given FD data phase.
    pub fn with_fd_phase(mut self, fd: Segments) -> Self {
        self.fd = Some(fd);
        self.error_signaling = true;
        self
    }

    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut fields =
            Fields::parse(descriptor, &[(Self::ERROR_SIGNALING, "xl_error_signaling")])?;
        let clock = fields.clock()?;
        let brp = fields.require("brp")?;
        let nom_brp = fields.take("nom_brp");
        let nominal = Segments::new(
            fields.require("nom_tseg1")?,
            fields.require("nom_tseg2")?,
            fields.require("nom_sjw")?,
        );
        let transceiver_mode_switch = fields.flag("xl_transceiver_mode_switch")?;
        let error_signaling = fields.flag("xl_error_signaling")?;
        let fd = phase(&mut fields, "fd", error_signaling)?;
        let xl = phase(&mut fields, "xl", transceiver_mode_switch)?;
        let bitrate = Self {
            clock,
            brp,
            nom_brp,
            nominal,
            fd,
            fd_ssp_offset: fields.take("fd_ssp_offset"),
            xl,
            xl_ssp_offset: fields.take("xl_ssp_offset"),
            pwm: Pwm {
                offset: fields.take("xl_pwm_offset"),
                short: fields.take("xl_pwm_short"),
                long: fields.take("xl_pwm_long"),
            },
            transceiver_mode_switch,
            error_signaling,
        };
        fields.finish()?;
        bitrate.validate()?;
        Ok(bitrate)
    }

    pub fn nominal_bitrate(&self) -> u32 {
        bitrate_of(self.clock, self.brp, &self.nominal)
    }

    pub fn fd_bitrate(&self) -> Option<u32> {
        self.fd.map(|fd| bitrate_of(self.clock, self.brp, &fd))
    }

    pub fn xl_bitrate(&self) -> Option<u32> {
        self.xl.map(|xl| bitrate_of(self.clock, self.brp, &xl))
    }
}

/// Reads `<prefix>_tseg1/_tseg2/_sjw`, all or none unless `required`.
fn phase(fields: &mut Fields, prefix: &str, required: bool) -> Result<Option<Segments>> {
    let tseg1 = fields.take(&format!("{prefix}_tseg1"));
    let tseg2 = fields.take(&format!("{prefix}_tseg2"));
    let sjw = fields.take(&format!("{prefix}_sjw"));
    match (tseg1, tseg2, sjw) {
        (Some(tseg1), Some(tseg2), Some(sjw)) => Ok(Some(Segments::new(tseg1, tseg2, sjw))),
        (None, None, None) if !required => Ok(None),
        _ => Err(CanError::Bitrate(format!(
            "{prefix}_tseg1, {prefix}_tseg2 and {prefix}_sjw are required together"
        ))),
    }
}

impl Config for BitrateXl {
    fn validate(&self) -> Result<()> {
        if self.clock.hz() == 0 {
            return Err(CanError::Bitrate("clock must be non-zero".to_string()));
        }
        if self.brp == 0 || self.nom_brp == Some(0) {
            return Err(CanError::Bitrate("prescalers must be non-zero".to_string()));
        }
        self.nominal.validate("nominal")?;
        match (self.transceiver_mode_switch, &self.xl) {
            (true, None) => {
                return Err(CanError::Bitrate(
                    "transceiver mode switching needs the xl phase".to_string(),
                ))
            }
            (_, Some(xl)) => xl.validate("xl")?,
            (false, None) => {}
        }
        match (self.error_signaling, &self.fd) {
            (true, None) => Err(CanError::Bitrate(
                "error signaling needs the fd phase".to_string(),
            )),
            (_, Some(fd)) => fd.validate("fd"),
            (false, None) => Ok(()),
        }
    }
}

impl fmt::Display for BitrateXl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.clock.write(f)?;
        write!(f, ",brp={}", self.brp)?;
        if let Some(nom_brp) = self.nom_brp {
            write!(f, ",nom_brp={nom_brp}")?;
        }
        write!(
            f,
            ",nom_tseg1={},nom_tseg2={},nom_sjw={}",
            self.nominal.tseg1, self.nominal.tseg2, self.nominal.sjw
        )?;
        if let Some(fd) = self.fd {
            write!(f, ",fd_tseg1={},fd_tseg2={},fd_sjw={}", fd.tseg1, fd.tseg2, fd.sjw)?;
        }
        if let Some(offset) = self.fd_ssp_offset {
            write!(f, ",fd_ssp_offset={offset}")?;
        }
        if let Some(xl) = self.xl {
            write!(f, ",xl_tseg1={},xl_tseg2={},xl_sjw={}", xl.tseg1, xl.tseg2, xl.sjw)?;
        }
        if let Some(offset) = self.xl_ssp_offset {
            write!(f, ",xl_ssp_offset={offset}")?;
        }
        if let Some(offset) = self.pwm.offset {
            write!(f, ",xl_pwm_offset={offset}")?;
        }
        if let Some(short) = self.pwm.short {
            write!(f, ",xl_pwm_short={short}")?;
        }
        if let Some(long) = self.pwm.long {
            write!(f, ",xl_pwm_long={long}")?;
        }
        if self.transceiver_mode_switch {
            f.write_str(",xl_transceiver_mode_switch=1")?;
        }
        if self.error_signaling {
            f.write_str(",xl_error_signaling=1")?;
        }
        Ok(())
    }
}

impl FromStr for BitrateXl {
    type Err = CanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Bit rate of any generation, as handed to an initialize call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bitrate {
    Btr0Btr1(u16),
    Fd(BitrateFd),
    Xl(BitrateXl),
}

impl Bitrate {
    pub fn generation(&self) -> Generation {
        match self {
            Bitrate::Btr0Btr1(_) => Generation::Classic,
            Bitrate::Fd(_) => Generation::Fd,
            Bitrate::Xl(_) => Generation::Xl,
        }
    }

    /// Initialize buffer: the little-endian code for classic channels, the
    /// NUL-terminated descriptor for FD and XL.
    pub fn encode(&self) -> Result<BytesMut> {
        match self {
            Bitrate::Btr0Btr1(code) => {
                let mut dst = BytesMut::with_capacity(2);
                dst.put_u16_le(*code);
                Ok(dst)
            }
            Bitrate::Fd(fd) => encode_text(&fd.to_string()),
            Bitrate::Xl(xl) => encode_text(&xl.to_string()),
        }
    }
}

impl Config for Bitrate {
    fn validate(&self) -> Result<()> {
        match self {
            Bitrate::Btr0Btr1(_) => Ok(()),
            Bitrate::Fd(fd) => fd.validate(),
            Bitrate::Xl(xl) => xl.validate(),
        }
    }
}

impl From<Baudrate> for Bitrate {
    fn from(baudrate: Baudrate) -> Self {
        Bitrate::Btr0Btr1(baudrate.code())
    }
}

impl From<BitrateFd> for Bitrate {
    fn from(fd: BitrateFd) -> Self {
        Bitrate::Fd(fd)
    }
}

impl From<BitrateXl> for Bitrate {
    fn from(xl: BitrateXl) -> Self {
        Bitrate::Xl(xl)
    }
}
