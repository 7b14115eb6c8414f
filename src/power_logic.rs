/// Decide whether the inactivity policy should ask for sleep.
///
/// External power (charger attached) keeps the device awake. Otherwise
/// sleep is due once the idle time reaches the timeout.
pub fn sleep_due(idle_secs: u64, idle_timeout_secs: u64, external_power: bool) -> bool {
    if external_power {
        return false;
    }

    idle_secs >= idle_timeout_secs
}
