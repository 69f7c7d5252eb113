// useful helpers for tests
#[macro_export]
macro_rules! dname {
    ($name:expr) => {
        <$crate::name::DomainName as std::convert::TryFrom<&str>>::try_from($name).unwrap()
    };
}

#[macro_export]
macro_rules! ipaddr {
    ($addr:expr) => {
        $addr.parse::<std::net::IpAddr>().unwrap()
    };
}
