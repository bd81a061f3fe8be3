//! Load and unload hooks registered through the ELF init/fini arrays.

use hugemap_core::runtime;

extern "C" fn on_load() {
    runtime::init();
}

extern "C" fn on_unload() {
    runtime::shutdown();
}

#[cfg(all(target_os = "linux", not(test)))]
#[used]
#[unsafe(link_section = ".init_array")]
static ON_LOAD: extern "C" fn() = on_load;

#[cfg(all(target_os = "linux", not(test)))]
#[used]
#[unsafe(link_section = ".fini_array")]
static ON_UNLOAD: extern "C" fn() = on_unload;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_are_repeatable() {
        on_load();
        on_load();
        assert!(runtime::stats().is_some());
        on_unload();
        on_unload();
    }
}
