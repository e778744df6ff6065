/// One telemetry snapshot from a UPS, collected once per polling interval.
///
/// Every field is optional; operations that need a missing field skip the
/// sample instead of failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Pack voltage, V.
    pub battery_voltage: Option<f64>,

    /// Charge as reported by the device, percent.
    pub battery_charge: Option<f64>,

    /// Output load, percent of the rated load.
    pub load: Option<f64>,

    /// Status flags, e.g. `"OL CHRG"` or `"OB DISCHRG"`.
    pub status: Option<String>,
}

impl Sample {
    /// Build a sample from named fields. Names are matched with either `.` or
    /// `_` as the separator (`battery.voltage` and `battery_voltage` are the
    /// same field). Unknown names and unparseable numbers are ignored.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut sample = Self::default();

        for (key, value) in fields {
            let value = value.trim();
            match key.trim().replace('.', "_").as_str() {
                "battery_voltage" => sample.battery_voltage = value.parse().ok(),
                "battery_charge" => sample.battery_charge = value.parse().ok(),
                "ups_load" => sample.load = value.parse().ok(),
                "ups_status" => sample.status = Some(value.to_string()),
                _ => (),
            }
        }

        sample
    }

    /// Parse `key: value` lines as printed by `upsc`.
    pub fn parse_upsc(text: &str) -> Self {
        Self::from_fields(text.lines().filter_map(|line| line.split_once(':')))
    }

    /// Whether the status says the UPS is running from its battery. `None` if
    /// there is no status.
    pub fn on_battery(&self) -> Option<bool> {
        self.status.as_deref().map(is_on_battery)
    }
}

/// Whether a status string contains the standalone word `OB`, in any case.
pub fn is_on_battery(status: &str) -> bool {
    status
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("ob"))
}
