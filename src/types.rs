use std::fmt;

/// Channel handle.
///
/// An opaque key into driver-side state. The value ranges group handles by
/// transport family; [`Handle::NONE`] addresses every open channel at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u16);

/// Transport family a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleFamily {
    Pci,
    Usb,
    Lan,
    Virtual,
}

impl Handle {
    /// Undefined/default value, "all channels" for uninitialize
    pub const NONE: Handle = Handle(0x00);

    pub const PCIBUS1: Handle = Handle(0x41);
    pub const PCIBUS2: Handle = Handle(0x42);
    pub const PCIBUS3: Handle = Handle(0x43);
    pub const PCIBUS4: Handle = Handle(0x44);
    pub const PCIBUS5: Handle = Handle(0x45);
    pub const PCIBUS6: Handle = Handle(0x46);
    pub const PCIBUS7: Handle = Handle(0x47);
    pub const PCIBUS8: Handle = Handle(0x48);
    pub const PCIBUS9: Handle = Handle(0x409);
    pub const PCIBUS10: Handle = Handle(0x40A);
    pub const PCIBUS11: Handle = Handle(0x40B);
    pub const PCIBUS12: Handle = Handle(0x40C);
    pub const PCIBUS13: Handle = Handle(0x40D);
    pub const PCIBUS14: Handle = Handle(0x40E);
    pub const PCIBUS15: Handle = Handle(0x40F);
    pub const PCIBUS16: Handle = Handle(0x410);

    pub const USBBUS1: Handle = Handle(0x51);
    pub const USBBUS2: Handle = Handle(0x52);
    pub const USBBUS3: Handle = Handle(0x53);
    pub const USBBUS4: Handle = Handle(0x54);
    pub const USBBUS5: Handle = Handle(0x55);
    pub const USBBUS6: Handle = Handle(0x56);
    pub const USBBUS7: Handle = Handle(0x57);
    pub const USBBUS8: Handle = Handle(0x58);
    pub const USBBUS9: Handle = Handle(0x509);
    pub const USBBUS10: Handle = Handle(0x50A);
    pub const USBBUS11: Handle = Handle(0x50B);
    pub const USBBUS12: Handle = Handle(0x50C);
    pub const USBBUS13: Handle = Handle(0x50D);
    pub const USBBUS14: Handle = Handle(0x50E);
    pub const USBBUS15: Handle = Handle(0x50F);
    pub const USBBUS16: Handle = Handle(0x510);

    pub const LANBUS1: Handle = Handle(0x801);
    pub const LANBUS2: Handle = Handle(0x802);
    pub const LANBUS3: Handle = Handle(0x803);
    pub const LANBUS4: Handle = Handle(0x804);
    pub const LANBUS5: Handle = Handle(0x805);
    pub const LANBUS6: Handle = Handle(0x806);
    pub const LANBUS7: Handle = Handle(0x807);
    pub const LANBUS8: Handle = Handle(0x808);
    pub const LANBUS9: Handle = Handle(0x809);
    pub const LANBUS10: Handle = Handle(0x80A);
    pub const LANBUS11: Handle = Handle(0x80B);
    pub const LANBUS12: Handle = Handle(0x80C);
    pub const LANBUS13: Handle = Handle(0x80D);
    pub const LANBUS14: Handle = Handle(0x80E);
    pub const LANBUS15: Handle = Handle(0x80F);
    pub const LANBUS16: Handle = Handle(0x810);

    pub const VIRTUALBUS1: Handle = Handle(0x901);
    pub const VIRTUALBUS2: Handle = Handle(0x902);
    pub const VIRTUALBUS3: Handle = Handle(0x903);
    pub const VIRTUALBUS4: Handle = Handle(0x904);
    pub const VIRTUALBUS5: Handle = Handle(0x905);
    pub const VIRTUALBUS6: Handle = Handle(0x906);
    pub const VIRTUALBUS7: Handle = Handle(0x907);
    pub const VIRTUALBUS8: Handle = Handle(0x908);
    pub const VIRTUALBUS9: Handle = Handle(0x909);
    pub const VIRTUALBUS10: Handle = Handle(0x90A);
    pub const VIRTUALBUS11: Handle = Handle(0x90B);
    pub const VIRTUALBUS12: Handle = Handle(0x90C);
    pub const VIRTUALBUS13: Handle = Handle(0x90D);
    pub const VIRTUALBUS14: Handle = Handle(0x90E);
    pub const VIRTUALBUS15: Handle = Handle(0x90F);
    pub const VIRTUALBUS16: Handle = Handle(0x910);

    /// Handle of the `channel`-th (1-based, 1..=16) channel of a family.
    pub fn new(family: HandleFamily, channel: u8) -> Option<Handle> {
        if !(1..=16).contains(&channel) {
            return None;
        }
        let channel = u16::from(channel);
        let value = match family {
            HandleFamily::Pci if channel <= 8 => 0x40 + channel,
            HandleFamily::Pci => 0x400 + channel,
            HandleFamily::Usb if channel <= 8 => 0x50 + channel,
            HandleFamily::Usb => 0x500 + channel,
            HandleFamily::Lan => 0x800 + channel,
            HandleFamily::Virtual => 0x900 + channel,
        };
        Some(Handle(value))
    }

    pub fn is_none(self) -> bool {
        self == Handle::NONE
    }

    pub fn family(self) -> Option<HandleFamily> {
        match self.0 {
            0x41..=0x48 | 0x409..=0x410 => Some(HandleFamily::Pci),
            0x51..=0x58 | 0x509..=0x510 => Some(HandleFamily::Usb),
            0x801..=0x810 => Some(HandleFamily::Lan),
            0x901..=0x910 => Some(HandleFamily::Virtual),
            _ => None,
        }
    }

    /// 1-based channel number inside the family.
    pub fn channel(self) -> Option<u8> {
        let family = self.family()?;
        let low = match (family, self.0) {
            (HandleFamily::Pci, 0x41..=0x48) => self.0 - 0x40,
            (HandleFamily::Usb, 0x51..=0x58) => self.0 - 0x50,
            _ => self.0 & 0xFF,
        };
        u8::try_from(low).ok()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

impl From<u16> for Handle {
    fn from(value: u16) -> Self {
        Handle(value)
    }
}

/// Kind of device behind a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Device {
    None = 0x00,
    Pci = 0x04,
    Usb = 0x05,
    Lan = 0x08,
}

impl Device {
    pub fn from_raw(value: u8) -> Option<Device> {
        match value {
            0x00 => Some(Device::None),
            0x04 => Some(Device::Pci),
            0x05 => Some(Device::Usb),
            0x08 => Some(Device::Lan),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// Configuration trait that must be implemented by all host-side configurations
pub trait Config: Send + Sync {
    fn validate(&self) -> crate::error::Result<()>;
}
