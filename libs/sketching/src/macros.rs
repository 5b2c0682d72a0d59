#[macro_export]
macro_rules! tagged_event {
    ($level:ident, $event_tag:path, $($arg:tt)*) => {{
        fn assert_eventtag(_: &$crate::EventTag) {}
        assert_eventtag(&$event_tag);
        let event_tag_id: u64 = $event_tag.into();
        $crate::tracing::event!($crate::tracing::Level::$level, event_tag_id, $($arg)*)
    }}
}

#[macro_export]
macro_rules! admin_debug {
    ($($arg:tt)*) => { $crate::tagged_event!(DEBUG, $crate::EventTag::AdminDebug, $($arg)*) }
}

#[macro_export]
macro_rules! admin_error {
    ($($arg:tt)*) => { $crate::tagged_event!(ERROR, $crate::EventTag::AdminError, $($arg)*) }
}

#[macro_export]
macro_rules! admin_warn {
    ($($arg:tt)*) => { $crate::tagged_event!(WARN, $crate::EventTag::AdminWarn, $($arg)*) }
}

#[macro_export]
macro_rules! admin_info {
    ($($arg:tt)*) => { $crate::tagged_event!(INFO, $crate::EventTag::AdminInfo, $($arg)*) }
}

#[macro_export]
macro_rules! request_error {
    ($($arg:tt)*) => { $crate::tagged_event!(ERROR, $crate::EventTag::RequestError, $($arg)*) }
}

#[macro_export]
macro_rules! request_warn {
    ($($arg:tt)*) => { $crate::tagged_event!(WARN, $crate::EventTag::RequestWarn, $($arg)*) }
}

#[macro_export]
macro_rules! request_info {
    ($($arg:tt)*) => { $crate::tagged_event!(INFO, $crate::EventTag::RequestInfo, $($arg)*) }
}

#[macro_export]
macro_rules! request_trace {
    ($($arg:tt)*) => { $crate::tagged_event!(TRACE, $crate::EventTag::RequestTrace, $($arg)*) }
}

#[macro_export]
macro_rules! filter_error {
    ($($arg:tt)*) => { $crate::tagged_event!(ERROR, $crate::EventTag::FilterError, $($arg)*) }
}

#[macro_export]
macro_rules! filter_warn {
    ($($arg:tt)*) => { $crate::tagged_event!(WARN, $crate::EventTag::FilterWarn, $($arg)*) }
}

#[macro_export]
macro_rules! filter_info {
    ($($arg:tt)*) => { $crate::tagged_event!(INFO, $crate::EventTag::FilterInfo, $($arg)*) }
}

#[macro_export]
macro_rules! filter_trace {
    ($($arg:tt)*) => { $crate::tagged_event!(TRACE, $crate::EventTag::FilterTrace, $($arg)*) }
}

#[macro_export]
macro_rules! group_error {
    ($($arg:tt)*) => { $crate::tagged_event!(ERROR, $crate::EventTag::GroupError, $($arg)*) }
}

#[macro_export]
macro_rules! group_warn {
    ($($arg:tt)*) => { $crate::tagged_event!(WARN, $crate::EventTag::GroupWarn, $($arg)*) }
}

#[macro_export]
macro_rules! group_trace {
    ($($arg:tt)*) => { $crate::tagged_event!(TRACE, $crate::EventTag::GroupTrace, $($arg)*) }
}

#[macro_export]
macro_rules! vattr_error {
    ($($arg:tt)*) => { $crate::tagged_event!(ERROR, $crate::EventTag::VattrError, $($arg)*) }
}

#[macro_export]
macro_rules! vattr_warn {
    ($($arg:tt)*) => { $crate::tagged_event!(WARN, $crate::EventTag::VattrWarn, $($arg)*) }
}

#[macro_export]
macro_rules! vattr_trace {
    ($($arg:tt)*) => { $crate::tagged_event!(TRACE, $crate::EventTag::VattrTrace, $($arg)*) }
}

#[macro_export]
macro_rules! perf_trace {
    ($($arg:tt)*) => { $crate::tagged_event!(TRACE, $crate::EventTag::PerfTrace, $($arg)*) }
}
