// TODO: find a way to query open handles outside of procfs
pub fn is_port_open(_port_name: &str) -> bool {
    false
}
