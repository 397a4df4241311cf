//! Buffers allocated by `wtsapi32.dll`.
//!
//! [`WtsMemory`] and [`WtsArray`] own one OS allocation each and release it
//! exactly once, on drop. The byte decoders at the bottom are shared with the
//! typed query helpers and work on plain slices.

use std::mem::size_of;

#[cfg(windows)]
pub(crate) use self::native::FreeWith;
#[cfg(windows)]
pub use self::native::{WtsArray, WtsMemory};

/// Read a `T` from the start of `bytes`, or `None` when the buffer is short.
pub fn decode_struct<T: Copy>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < size_of::<T>() {
        return None;
    }
    // SAFETY: length checked above; `T: Copy` plain data read unaligned.
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

pub fn decode_u32(bytes: &[u8]) -> Option<u32> {
    bytes.get(..4).map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn decode_u16(bytes: &[u8]) -> Option<u16> {
    bytes.get(..2).map(|b| u16::from_ne_bytes([b[0], b[1]]))
}

/// UTF-16 text up to the first NUL or the end of the buffer. A trailing odd
/// byte is ignored.
pub fn decode_wide(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(windows)]
mod native {
    use std::ffi::c_void;
    use std::fmt;
    use std::marker::PhantomData;

    use log::warn;

    use super::{decode_struct, decode_u16, decode_u32, decode_wide};
    use crate::loader::wtsapi;

    #[cfg(test)]
    thread_local! {
        /// Native frees issued by guards on this thread.
        pub(super) static FREE_CALLS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    fn note_free() {
        #[cfg(test)]
        FREE_CALLS.with(|c| c.set(c.get() + 1));
    }

    /// A single buffer returned through a `ppBuffer` out-parameter.
    pub struct WtsMemory {
        ptr: *mut c_void,
        len: u32,
    }

    impl WtsMemory {
        /// # Safety
        /// `ptr` must be null or a buffer of at least `len` bytes allocated by
        /// `wtsapi32.dll` and freeable with `WTSFreeMemory`. Ownership moves
        /// into the guard.
        pub unsafe fn from_raw(ptr: *mut c_void, len: u32) -> Self {
            Self { ptr, len }
        }

        pub fn as_ptr(&self) -> *const c_void {
            self.ptr
        }

        pub fn len(&self) -> usize {
            if self.ptr.is_null() {
                0
            } else {
                self.len as usize
            }
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn as_bytes(&self) -> &[u8] {
            if self.ptr.is_null() {
                return &[];
            }
            // SAFETY: the OS reported `len` valid bytes at `ptr`.
            unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len as usize) }
        }

        pub fn read_struct<T: Copy>(&self) -> Option<T> {
            decode_struct(self.as_bytes())
        }

        pub fn read_u32(&self) -> Option<u32> {
            decode_u32(self.as_bytes())
        }

        pub fn read_u16(&self) -> Option<u16> {
            decode_u16(self.as_bytes())
        }

        pub fn to_string_lossy(&self) -> String {
            decode_wide(self.as_bytes())
        }

        /// Give up ownership; the caller must free the pointer with
        /// `WTSFreeMemory`.
        pub fn into_raw(self) -> *mut c_void {
            let ptr = self.ptr;
            std::mem::forget(self);
            ptr
        }
    }

    impl Drop for WtsMemory {
        fn drop(&mut self) {
            if self.ptr.is_null() {
                return;
            }
            if let Ok(api) = wtsapi() {
                // SAFETY: allocated by wtsapi32 and not freed before.
                unsafe { (api.free_memory)(self.ptr) };
                note_free();
            }
        }
    }

    impl fmt::Debug for WtsMemory {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("WtsMemory")
                .field("ptr", &self.ptr)
                .field("len", &self.len())
                .finish()
        }
    }

    // SAFETY: the buffer is plain heap memory not tied to a thread.
    unsafe impl Send for WtsMemory {}

    pub(crate) enum FreeWith {
        Memory,
        /// `WTSFreeMemoryExW` with the given `WTS_TYPE_CLASS`.
        MemoryEx(i32),
    }

    /// A counted array of `T` returned by an enumeration call.
    pub struct WtsArray<T> {
        ptr: *mut T,
        count: u32,
        free: FreeWith,
        _marker: PhantomData<T>,
    }

    impl<T> WtsArray<T> {
        /// # Safety
        /// `ptr` must be null or point to `count` initialized `T`s allocated
        /// by `wtsapi32.dll` and releasable by `free`.
        pub(crate) unsafe fn from_raw(ptr: *mut T, count: u32, free: FreeWith) -> Self {
            Self { ptr, count, free, _marker: PhantomData }
        }

        pub fn as_slice(&self) -> &[T] {
            if self.ptr.is_null() || self.count == 0 {
                return &[];
            }
            // SAFETY: the OS reported `count` entries at `ptr`.
            unsafe { std::slice::from_raw_parts(self.ptr, self.count as usize) }
        }

        pub fn len(&self) -> usize {
            self.as_slice().len()
        }

        pub fn is_empty(&self) -> bool {
            self.as_slice().is_empty()
        }
    }

    impl<T> Drop for WtsArray<T> {
        fn drop(&mut self) {
            if self.ptr.is_null() {
                return;
            }
            let Ok(api) = wtsapi() else { return };
            note_free();
            match self.free {
                // SAFETY: allocated by wtsapi32 and not freed before.
                FreeWith::Memory => unsafe { (api.free_memory)(self.ptr.cast()) },
                FreeWith::MemoryEx(class) => {
                    // SAFETY: as above; class and count match the allocation.
                    let ok = unsafe { (api.free_memory_ex)(class, self.ptr.cast(), self.count) };
                    if ok == 0 {
                        warn!("WTSFreeMemoryExW failed for {} entries", self.count);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::WTS_CLIENT_DISPLAY;

    #[test]
    fn decode_struct_needs_enough_bytes() {
        let mut bytes = Vec::new();
        for v in [1920u32, 1080, 24] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        let d: WTS_CLIENT_DISPLAY = decode_struct(&bytes).unwrap();
        assert_eq!(d.HorizontalResolution, 1920);
        assert_eq!(d.ColorDepth, 24);
        assert!(decode_struct::<WTS_CLIENT_DISPLAY>(&bytes[..11]).is_none());
    }

    #[test]
    fn decode_struct_tolerates_misalignment() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&7u32.to_ne_bytes());
        assert_eq!(decode_struct::<u32>(&bytes[1..]), Some(7));
    }

    #[test]
    fn decode_integers() {
        assert_eq!(decode_u32(&5u32.to_ne_bytes()), Some(5));
        assert_eq!(decode_u32(&[1, 2]), None);
        assert_eq!(decode_u16(&2u16.to_ne_bytes()), Some(2));
        assert_eq!(decode_u16(&[]), None);
    }

    #[test]
    fn decode_wide_stops_at_nul_and_end() {
        let mut bytes = Vec::new();
        for c in "alice\0junk".encode_utf16() {
            bytes.extend_from_slice(&c.to_ne_bytes());
        }
        assert_eq!(decode_wide(&bytes), "alice");
        assert_eq!(decode_wide(&bytes[..5]), "al");
        assert_eq!(decode_wide(&[]), "");
    }

    #[cfg(windows)]
    mod native_guards {
        use crate::memory::native::FREE_CALLS;
        use crate::memory::{FreeWith, WtsArray, WtsMemory};
        use crate::abi::{WTS_CURRENT_SERVER_HANDLE, WTS_SESSION_INFOW};
        use crate::loader::wtsapi;
        use crate::types::InfoClass;
        use crate::wts_ffi;

        fn frees() -> usize {
            FREE_CALLS.with(|c| c.get())
        }

        fn user_name_buffer() -> WtsMemory {
            let session = wts_ffi::current_session_id().unwrap();
            wts_ffi::query_session_information(WTS_CURRENT_SERVER_HANDLE, session, InfoClass::UserName)
                .unwrap()
        }

        #[test]
        fn empty_array_is_empty_and_frees_nothing() {
            let before = frees();
            // SAFETY: a null pointer with a zero count owns nothing.
            let array = unsafe {
                WtsArray::<WTS_SESSION_INFOW>::from_raw(std::ptr::null_mut(), 0, FreeWith::Memory)
            };
            assert!(array.as_slice().is_empty());
            assert!(array.is_empty());
            drop(array);
            assert_eq!(frees(), before);
        }

        #[test]
        fn query_buffer_is_freed_once_on_drop() {
            let buf = user_name_buffer();
            assert!(!buf.is_empty());
            let before = frees();
            drop(buf);
            assert_eq!(frees(), before + 1);
        }

        #[test]
        fn into_raw_hands_over_the_free() {
            let buf = user_name_buffer();
            let before = frees();
            let ptr = buf.into_raw();
            assert_eq!(frees(), before);
            assert!(!ptr.is_null());
            // SAFETY: ownership was released by `into_raw`; freed once here.
            unsafe { (wtsapi().unwrap().free_memory)(ptr) };
            assert_eq!(frees(), before);
        }

        #[test]
        fn enumeration_frees_its_array_once() {
            let before = frees();
            let sessions = wts_ffi::enumerate_sessions(WTS_CURRENT_SERVER_HANDLE).unwrap();
            assert!(!sessions.is_empty());
            assert_eq!(frees(), before + 1);
        }
    }
}
