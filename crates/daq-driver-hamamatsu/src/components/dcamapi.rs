//! Hamamatsu DCAM-API backend.
//!
//! Loads the DCAM-API runtime at run time from the directory registered under
//! [`dll_path::DCAMAPI`], so the driver builds on machines without the SDK.
//! Property IDs are looked up by name (`"EXPOSURE TIME"`, `"TRIGGER SOURCE"`, ...)
//! when the session opens.

#![allow(unsafe_code)]

use crate::components::dll_path;
use crate::components::sdk::{DcamBackend, DcamCamera, DeviceInfo};
use anyhow::{anyhow, bail, Context, Result};
use daq_core::camera::{AcquisitionMode, CameraStatus, Roi, TriggerMode};
use daq_core::data::Frame;
use daq_core::error::{DriverError, DriverErrorKind};
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DRIVER_TYPE: &str = "dcamapi";

// =============================================================================
// DCAM-API Types (from dcamapi4.h)
// =============================================================================

type Hdcam = *mut c_void;
type HdcamWait = *mut c_void;
type DcamErr = i32;

#[repr(C)]
struct DcamApiInit {
    size: i32,
    device_count: i32,
    reserved: i32,
    initoptionbytes: i32,
    initoption: *const i32,
    guid: *const c_void,
}

#[repr(C)]
struct DcamDevOpen {
    size: i32,
    index: i32,
    hdcam: Hdcam,
}

#[repr(C)]
struct DcamDevString {
    size: i32,
    string_id: i32,
    text: *mut c_char,
    textbytes: i32,
}

#[repr(C)]
struct DcamWaitOpen {
    size: i32,
    supportevent: i32,
    hwait: HdcamWait,
    hdcam: Hdcam,
}

#[repr(C)]
struct DcamWaitStart {
    size: i32,
    eventhappened: i32,
    eventmask: i32,
    timeout: i32,
}

#[repr(C)]
#[derive(Default)]
struct DcamTimestamp {
    sec: u32,
    microsec: i32,
}

#[repr(C)]
struct DcamBufFrame {
    size: i32,
    kind: i32,
    option: i32,
    frame: i32,
    buf: *mut c_void,
    rowbytes: i32,
    pixel_type: i32,
    width: i32,
    height: i32,
    left: i32,
    top: i32,
    timestamp: DcamTimestamp,
    framestamp: i32,
    camerastamp: i32,
}

#[repr(C)]
struct DcamCapTransferInfo {
    size: i32,
    kind: i32,
    newest_frame_index: i32,
    frame_count: i32,
}

const DCAMCAP_START_SEQUENCE: i32 = -1;
const DCAMCAP_START_SNAP: i32 = 0;

const DCAMCAP_STATUS_ERROR: i32 = 0x0000;
const DCAMCAP_STATUS_BUSY: i32 = 0x0001;
const DCAMCAP_STATUS_READY: i32 = 0x0002;
const DCAMCAP_STATUS_STABLE: i32 = 0x0003;
const DCAMCAP_STATUS_UNSTABLE: i32 = 0x0004;

const DCAMERR_TIMEOUT: i32 = 0x8000_0106_u32 as i32;

const DCAMWAIT_CAPEVENT_FRAMEREADY: i32 = 0x0002;
const DCAMWAIT_TIMEOUT_INFINITE: i32 = i32::MIN; // 0x80000000

const DCAM_IDSTR_CAMERAID: i32 = 0x0400_0102;
const DCAM_IDSTR_VENDOR: i32 = 0x0400_0103;
const DCAM_IDSTR_MODEL: i32 = 0x0400_0104;
const DCAM_IDSTR_CAMERAVERSION: i32 = 0x0400_0105;

const DCAMPROP_OPTION_SUPPORT: i32 = 0;
const DCAMBUF_ATTACHKIND_FRAME: i32 = 0;
const DCAM_PIXELTYPE_MONO8: i32 = 0x0000_0001;

const SUBARRAY_MODE_OFF: f64 = 1.0;
const SUBARRAY_MODE_ON: f64 = 2.0;

fn failed(err: DcamErr) -> bool {
    err < 0
}

// =============================================================================
// SDK Function Pointers
// =============================================================================

type FnApiInit = unsafe extern "system" fn(*mut DcamApiInit) -> DcamErr;
type FnApiUninit = unsafe extern "system" fn() -> DcamErr;
type FnDevOpen = unsafe extern "system" fn(*mut DcamDevOpen) -> DcamErr;
type FnDevClose = unsafe extern "system" fn(Hdcam) -> DcamErr;
type FnDevGetString = unsafe extern "system" fn(Hdcam, *mut DcamDevString) -> DcamErr;
type FnPropGetValue = unsafe extern "system" fn(Hdcam, i32, *mut f64) -> DcamErr;
type FnPropSetValue = unsafe extern "system" fn(Hdcam, i32, f64) -> DcamErr;
type FnPropGetNextId = unsafe extern "system" fn(Hdcam, *mut i32, i32) -> DcamErr;
type FnPropGetName = unsafe extern "system" fn(Hdcam, i32, *mut c_char, i32) -> DcamErr;
type FnBufAlloc = unsafe extern "system" fn(Hdcam, i32) -> DcamErr;
type FnBufRelease = unsafe extern "system" fn(Hdcam, i32) -> DcamErr;
type FnBufLockFrame = unsafe extern "system" fn(Hdcam, *mut DcamBufFrame) -> DcamErr;
type FnCapStart = unsafe extern "system" fn(Hdcam, i32) -> DcamErr;
type FnCapStop = unsafe extern "system" fn(Hdcam) -> DcamErr;
type FnCapStatus = unsafe extern "system" fn(Hdcam, *mut i32) -> DcamErr;
type FnCapTransferInfo = unsafe extern "system" fn(Hdcam, *mut DcamCapTransferInfo) -> DcamErr;
type FnWaitOpen = unsafe extern "system" fn(*mut DcamWaitOpen) -> DcamErr;
type FnWaitClose = unsafe extern "system" fn(HdcamWait) -> DcamErr;
type FnWaitStart = unsafe extern "system" fn(HdcamWait, *mut DcamWaitStart) -> DcamErr;

/// DCAM-API entry points resolved from the runtime library.
struct DcamApi {
    api_init: FnApiInit,
    api_uninit: FnApiUninit,
    dev_open: FnDevOpen,
    dev_close: FnDevClose,
    dev_getstring: FnDevGetString,
    prop_getvalue: FnPropGetValue,
    prop_setvalue: FnPropSetValue,
    prop_getnextid: FnPropGetNextId,
    prop_getname: FnPropGetName,
    buf_alloc: FnBufAlloc,
    buf_release: FnBufRelease,
    buf_lockframe: FnBufLockFrame,
    cap_start: FnCapStart,
    cap_stop: FnCapStop,
    cap_status: FnCapStatus,
    cap_transferinfo: FnCapTransferInfo,
    wait_open: FnWaitOpen,
    wait_close: FnWaitClose,
    wait_start: FnWaitStart,
    // Must outlive every function pointer above.
    _library: libloading::Library,
}

/// Resolve one symbol, copying the function pointer out of the library.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(library: &libloading::Library, name: &[u8]) -> Result<T> {
    let sym = library.get::<T>(name).map_err(|e| {
        let printable = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        DriverError::new(
            DRIVER_TYPE,
            DriverErrorKind::Initialization,
            format!("Failed to load {}: {}", printable, e),
        )
    })?;
    Ok(*sym)
}

impl DcamApi {
    fn library_name() -> &'static Path {
        if cfg!(target_os = "windows") {
            Path::new("dcamapi.dll")
        } else {
            Path::new("libdcamapi.so")
        }
    }

    /// Load the runtime from the registered directory, falling back to the
    /// system search path.
    fn load() -> Result<Self> {
        let path = dll_path::library_file(dll_path::DCAMAPI, Self::library_name())
            .unwrap_or_else(|| PathBuf::from(Self::library_name()));
        tracing::info!("Loading DCAM-API from {}", path.display());

        // SAFETY: Loading the vendor runtime runs its initializers; DCAM-API has no
        // load-time preconditions.
        let library = unsafe { libloading::Library::new(&path) }.map_err(|e| {
            DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Initialization,
                format!("Failed to load DCAM-API from {}: {}", path.display(), e),
            )
        })?;

        // SAFETY: Signatures match dcamapi4.h.
        unsafe {
            Ok(Self {
                api_init: symbol(&library, b"dcamapi_init\0")?,
                api_uninit: symbol(&library, b"dcamapi_uninit\0")?,
                dev_open: symbol(&library, b"dcamdev_open\0")?,
                dev_close: symbol(&library, b"dcamdev_close\0")?,
                dev_getstring: symbol(&library, b"dcamdev_getstring\0")?,
                prop_getvalue: symbol(&library, b"dcamprop_getvalue\0")?,
                prop_setvalue: symbol(&library, b"dcamprop_setvalue\0")?,
                prop_getnextid: symbol(&library, b"dcamprop_getnextid\0")?,
                prop_getname: symbol(&library, b"dcamprop_getname\0")?,
                buf_alloc: symbol(&library, b"dcambuf_alloc\0")?,
                buf_release: symbol(&library, b"dcambuf_release\0")?,
                buf_lockframe: symbol(&library, b"dcambuf_lockframe\0")?,
                cap_start: symbol(&library, b"dcamcap_start\0")?,
                cap_stop: symbol(&library, b"dcamcap_stop\0")?,
                cap_status: symbol(&library, b"dcamcap_status\0")?,
                cap_transferinfo: symbol(&library, b"dcamcap_transferinfo\0")?,
                wait_open: symbol(&library, b"dcamwait_open\0")?,
                wait_close: symbol(&library, b"dcamwait_close\0")?,
                wait_start: symbol(&library, b"dcamwait_start\0")?,
                _library: library,
            })
        }
    }
}

fn check(call: &str, err: DcamErr) -> Result<()> {
    if failed(err) {
        let kind = if err == DCAMERR_TIMEOUT {
            DriverErrorKind::Timeout
        } else {
            DriverErrorKind::Communication
        };
        return Err(DriverError::new(
            DRIVER_TYPE,
            kind,
            format!("{} failed: 0x{:08X}", call, err as u32),
        )
        .into());
    }
    Ok(())
}

/// Log a failed cleanup call without aborting the rest of the teardown.
fn log_cleanup(call: &str, err: DcamErr) {
    if failed(err) {
        tracing::debug!("{} failed during close: 0x{:08X}", call, err as u32);
    }
}

/// Raw handle wrapper.
///
/// SAFETY: DCAM-API handles may be used from any thread as long as calls are
/// serialized, which `&mut self` on the session guarantees.
struct Handle(Hdcam);
unsafe impl Send for Handle {}

struct WaitHandle(HdcamWait);
unsafe impl Send for WaitHandle {}

/// Initialized DCAM-API runtime; uninitialized on drop.
struct Runtime {
    api: DcamApi,
    device_count: i32,
}

impl Runtime {
    fn init() -> Result<Self> {
        let api = DcamApi::load()?;
        let mut param = DcamApiInit {
            size: std::mem::size_of::<DcamApiInit>() as i32,
            device_count: 0,
            reserved: 0,
            initoptionbytes: 0,
            initoption: std::ptr::null(),
            guid: std::ptr::null(),
        };
        // SAFETY: `param` is a valid, sized DCAMAPI_INIT.
        let err = unsafe { (api.api_init)(&mut param) };
        check("dcamapi_init", err)?;
        tracing::info!("DCAM-API initialized ({} device(s))", param.device_count);
        Ok(Self {
            api,
            device_count: param.device_count,
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // SAFETY: Paired with the successful dcamapi_init in `Runtime::init`.
        unsafe {
            (self.api.api_uninit)();
        }
        tracing::info!("DCAM-API uninitialized");
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Opens the first camera found by DCAM-API.
#[derive(Debug, Clone, Default)]
pub struct DcamApiBackend {
    /// Device index passed to `dcamdev_open`
    pub device_index: i32,
}

impl DcamBackend for DcamApiBackend {
    type Camera = DcamApiCamera;

    fn open(&self) -> Result<DcamApiCamera> {
        let runtime = Arc::new(Runtime::init()?);
        if self.device_index >= runtime.device_count {
            bail!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Initialization,
                format!(
                    "No camera at index {} ({} found)",
                    self.device_index, runtime.device_count
                ),
            ));
        }

        let mut dev = DcamDevOpen {
            size: std::mem::size_of::<DcamDevOpen>() as i32,
            index: self.device_index,
            hdcam: std::ptr::null_mut(),
        };
        // SAFETY: `dev` is a valid, sized DCAMDEV_OPEN.
        check("dcamdev_open", unsafe { (runtime.api.dev_open)(&mut dev) })?;
        let hdcam = dev.hdcam;

        let mut wait = DcamWaitOpen {
            size: std::mem::size_of::<DcamWaitOpen>() as i32,
            supportevent: 0,
            hwait: std::ptr::null_mut(),
            hdcam,
        };
        // SAFETY: `wait` is a valid, sized DCAMWAIT_OPEN on an open device.
        let err = unsafe { (runtime.api.wait_open)(&mut wait) };
        if failed(err) {
            // SAFETY: hdcam was just opened and is not shared.
            unsafe {
                (runtime.api.dev_close)(hdcam);
            }
            check("dcamwait_open", err)?;
        }

        let mut camera = DcamApiCamera {
            runtime,
            hdcam: Handle(hdcam),
            hwait: WaitHandle(wait.hwait),
            props: HashMap::new(),
            frames_read: 0,
            buffer_frames: 0,
            open: true,
        };
        camera.props = camera.enumerate_properties()?;
        tracing::info!(
            "DCAM camera opened ({} properties)",
            camera.props.len()
        );
        Ok(camera)
    }
}

/// Open DCAM-API session.
pub struct DcamApiCamera {
    runtime: Arc<Runtime>,
    hdcam: Handle,
    hwait: WaitHandle,
    props: HashMap<String, i32>,
    frames_read: i32,
    buffer_frames: i32,
    open: bool,
}

impl DcamApiCamera {
    fn api(&self) -> &DcamApi {
        &self.runtime.api
    }

    fn enumerate_properties(&self) -> Result<HashMap<String, i32>> {
        let mut props = HashMap::new();
        let mut id: i32 = 0;
        loop {
            // SAFETY: `id` is a valid in/out pointer on an open device.
            let err = unsafe {
                (self.api().prop_getnextid)(self.hdcam.0, &mut id, DCAMPROP_OPTION_SUPPORT)
            };
            if failed(err) || id == 0 {
                break;
            }
            let mut name = [0 as c_char; 64];
            // SAFETY: `name` is writable for its full length.
            let err = unsafe {
                (self.api().prop_getname)(self.hdcam.0, id, name.as_mut_ptr(), name.len() as i32)
            };
            if !failed(err) {
                // SAFETY: DCAM NUL-terminates names that fit the buffer.
                let name = unsafe { CStr::from_ptr(name.as_ptr()) }
                    .to_string_lossy()
                    .to_uppercase();
                props.insert(name, id);
            }
        }
        Ok(props)
    }

    fn prop_id(&self, name: &str) -> Result<i32> {
        self.props.get(name).copied().ok_or_else(|| {
            DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                format!("camera has no property '{}'", name),
            )
            .into()
        })
    }

    fn get_prop(&self, name: &str) -> Result<f64> {
        let id = self.prop_id(name)?;
        let mut value = 0.0;
        // SAFETY: `value` is a valid out pointer.
        let err = unsafe { (self.api().prop_getvalue)(self.hdcam.0, id, &mut value) };
        check(&format!("dcamprop_getvalue({})", name), err)?;
        Ok(value)
    }

    fn set_prop(&mut self, name: &str, value: f64) -> Result<()> {
        let id = self.prop_id(name)?;
        tracing::debug!("DCAM set '{}' = {}", name, value);
        // SAFETY: Plain value call on an open device.
        let err = unsafe { (self.api().prop_setvalue)(self.hdcam.0, id, value) };
        check(&format!("dcamprop_setvalue({})", name), err)
    }

    fn get_string(&self, string_id: i32) -> Result<String> {
        let mut text = [0 as c_char; 256];
        let mut param = DcamDevString {
            size: std::mem::size_of::<DcamDevString>() as i32,
            string_id,
            text: text.as_mut_ptr(),
            textbytes: text.len() as i32,
        };
        // SAFETY: `param.text` points to `text`, which outlives the call.
        let err = unsafe { (self.api().dev_getstring)(self.hdcam.0, &mut param) };
        check("dcamdev_getstring", err)?;
        // SAFETY: DCAM NUL-terminates strings that fit the buffer.
        Ok(unsafe { CStr::from_ptr(text.as_ptr()) }
            .to_string_lossy()
            .into_owned())
    }

    fn transfer_info(&self) -> Result<DcamCapTransferInfo> {
        let mut info = DcamCapTransferInfo {
            size: std::mem::size_of::<DcamCapTransferInfo>() as i32,
            kind: 0,
            newest_frame_index: -1,
            frame_count: 0,
        };
        // SAFETY: `info` is a valid, sized DCAMCAP_TRANSFERINFO.
        let err = unsafe { (self.api().cap_transferinfo)(self.hdcam.0, &mut info) };
        check("dcamcap_transferinfo", err)?;
        Ok(info)
    }

    fn lock_frame(&self, index: i32) -> Result<Frame> {
        let mut frame = DcamBufFrame {
            size: std::mem::size_of::<DcamBufFrame>() as i32,
            kind: 0,
            option: 0,
            frame: index,
            buf: std::ptr::null_mut(),
            rowbytes: 0,
            pixel_type: 0,
            width: 0,
            height: 0,
            left: 0,
            top: 0,
            timestamp: DcamTimestamp::default(),
            framestamp: 0,
            camerastamp: 0,
        };
        // SAFETY: `frame` is a valid, sized DCAMBUF_FRAME.
        let err = unsafe { (self.api().buf_lockframe)(self.hdcam.0, &mut frame) };
        check("dcambuf_lockframe", err)?;
        if frame.buf.is_null() || frame.width <= 0 || frame.height <= 0 {
            return Err(anyhow!("dcambuf_lockframe returned an empty frame"));
        }

        let bit_depth = if frame.pixel_type == DCAM_PIXELTYPE_MONO8 { 8 } else { 16 };
        let len = frame.rowbytes as usize * frame.height as usize;
        // SAFETY: The locked buffer holds `rowbytes * height` bytes until the next
        // capture overwrites it; we copy out immediately.
        let bytes = unsafe { std::slice::from_raw_parts(frame.buf as *const u8, len) };
        Frame::from_bytes(
            frame.width as u32,
            frame.height as u32,
            bit_depth,
            frame.rowbytes as usize,
            bytes,
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            bail!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Communication,
                "session is closed",
            ));
        }
        Ok(())
    }
}

fn trigger_source(mode: TriggerMode) -> f64 {
    match mode {
        TriggerMode::Internal => 1.0,
        TriggerMode::External => 2.0,
        TriggerMode::Software => 3.0,
        TriggerMode::MasterPulse => 4.0,
    }
}

fn trigger_mode_from_source(source: i32) -> Result<TriggerMode> {
    match source {
        1 => Ok(TriggerMode::Internal),
        2 => Ok(TriggerMode::External),
        3 => Ok(TriggerMode::Software),
        4 => Ok(TriggerMode::MasterPulse),
        other => bail!(DriverError::new(
            DRIVER_TYPE,
            DriverErrorKind::Hardware,
            format!("camera reports unsupported trigger source {}", other),
        )),
    }
}

fn capture_mode(mode: AcquisitionMode) -> i32 {
    match mode {
        AcquisitionMode::Snap => DCAMCAP_START_SNAP,
        AcquisitionMode::Sequence => DCAMCAP_START_SEQUENCE,
    }
}

impl DcamCamera for DcamApiCamera {
    fn device_info(&self) -> Result<DeviceInfo> {
        self.ensure_open()?;
        Ok(DeviceInfo {
            vendor: self.get_string(DCAM_IDSTR_VENDOR)?,
            model: self.get_string(DCAM_IDSTR_MODEL)?,
            serial_number: self.get_string(DCAM_IDSTR_CAMERAID)?,
            camera_version: self.get_string(DCAM_IDSTR_CAMERAVERSION)?,
        })
    }

    fn data_dimensions(&self) -> Result<(u32, u32)> {
        let rows = self.get_prop("IMAGE HEIGHT")?;
        let cols = self.get_prop("IMAGE WIDTH")?;
        Ok((rows as u32, cols as u32))
    }

    fn set_exposure(&mut self, seconds: f64) -> Result<()> {
        self.set_prop("EXPOSURE TIME", seconds)
    }

    fn get_exposure(&self) -> Result<f64> {
        self.get_prop("EXPOSURE TIME")
    }

    fn set_contrast_gain(&mut self, value: f64) -> Result<()> {
        self.set_prop("CONTRAST GAIN", value)
    }

    fn get_contrast_gain(&self) -> Result<f64> {
        self.get_prop("CONTRAST GAIN")
    }

    fn set_sensitivity(&mut self, value: f64) -> Result<()> {
        self.set_prop("SENSITIVITY", value)
    }

    fn get_sensitivity(&self) -> Result<f64> {
        self.get_prop("SENSITIVITY")
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.set_prop("TRIGGER SOURCE", trigger_source(mode))
    }

    fn get_trigger_mode(&self) -> Result<TriggerMode> {
        trigger_mode_from_source(self.get_prop("TRIGGER SOURCE")? as i32)
    }

    fn set_roi(&mut self, roi: Roi) -> Result<()> {
        if roi.hbin != roi.vbin {
            bail!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Configuration,
                format!("binning must be symmetric, got {}x{}", roi.hbin, roi.vbin),
            ));
        }
        self.set_prop("SUBARRAY MODE", SUBARRAY_MODE_OFF)?;
        self.set_prop("BINNING", roi.hbin as f64)?;
        self.set_prop("SUBARRAY HPOS", roi.hstart as f64)?;
        self.set_prop("SUBARRAY HSIZE", roi.width() as f64)?;
        self.set_prop("SUBARRAY VPOS", roi.vstart as f64)?;
        self.set_prop("SUBARRAY VSIZE", roi.height() as f64)?;
        self.set_prop("SUBARRAY MODE", SUBARRAY_MODE_ON)
    }

    fn get_roi(&self) -> Result<Roi> {
        let hpos = self.get_prop("SUBARRAY HPOS")? as u32;
        let hsize = self.get_prop("SUBARRAY HSIZE")? as u32;
        let vpos = self.get_prop("SUBARRAY VPOS")? as u32;
        let vsize = self.get_prop("SUBARRAY VSIZE")? as u32;
        let bin = self.get_prop("BINNING")? as u32;
        Ok(Roi::new(
            hpos,
            hpos + hsize.max(1) - 1,
            vpos,
            vpos + vsize.max(1) - 1,
            bin.max(1),
        ))
    }

    fn setup_acquisition(&mut self, mode: AcquisitionMode, nframes: u32) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!("DCAM buffer setup: {} x {} frames", mode, nframes);
        // SAFETY: Releasing with no buffer attached is a no-op error we ignore.
        unsafe {
            (self.api().buf_release)(self.hdcam.0, DCAMBUF_ATTACHKIND_FRAME);
        }
        // SAFETY: Plain value call on an open device.
        let err = unsafe { (self.api().buf_alloc)(self.hdcam.0, nframes as i32) };
        check("dcambuf_alloc", err)?;
        self.frames_read = 0;
        self.buffer_frames = nframes as i32;
        Ok(())
    }

    fn start_acquisition(&mut self, mode: AcquisitionMode, _nframes: u32) -> Result<()> {
        self.ensure_open()?;
        // SAFETY: Buffers were allocated in `setup_acquisition`.
        let err = unsafe { (self.api().cap_start)(self.hdcam.0, capture_mode(mode)) };
        check("dcamcap_start", err)
    }

    fn wait_for_frame(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut param = DcamWaitStart {
            size: std::mem::size_of::<DcamWaitStart>() as i32,
            eventhappened: 0,
            eventmask: DCAMWAIT_CAPEVENT_FRAMEREADY,
            timeout: DCAMWAIT_TIMEOUT_INFINITE,
        };
        // SAFETY: `param` is a valid, sized DCAMWAIT_START; hwait belongs to hdcam.
        let err = unsafe { (self.api().wait_start)(self.hwait.0, &mut param) };
        check("dcamwait_start", err)
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        self.ensure_open()?;
        // SAFETY: Plain call on an open device.
        let err = unsafe { (self.api().cap_stop)(self.hdcam.0) };
        check("dcamcap_stop", err)
    }

    fn acquisition_in_progress(&self) -> Result<bool> {
        Ok(self.status()? == CameraStatus::Busy)
    }

    fn status(&self) -> Result<CameraStatus> {
        self.ensure_open()?;
        let mut status: i32 = 0;
        // SAFETY: `status` is a valid out pointer.
        let err = unsafe { (self.api().cap_status)(self.hdcam.0, &mut status) };
        check("dcamcap_status", err)?;
        Ok(match status {
            DCAMCAP_STATUS_ERROR => CameraStatus::Error,
            DCAMCAP_STATUS_BUSY => CameraStatus::Busy,
            DCAMCAP_STATUS_READY => CameraStatus::Ready,
            DCAMCAP_STATUS_STABLE => CameraStatus::Stable,
            DCAMCAP_STATUS_UNSTABLE => CameraStatus::Unstable,
            _ => CameraStatus::Error,
        })
    }

    fn read_newest_image(&mut self) -> Result<Option<Frame>> {
        self.ensure_open()?;
        let info = self.transfer_info()?;
        if info.frame_count <= 0 || info.newest_frame_index < 0 {
            return Ok(None);
        }
        let frame = self.lock_frame(info.newest_frame_index)?;
        self.frames_read = info.frame_count;
        Ok(Some(frame))
    }

    fn read_multiple_images(&mut self) -> Result<Vec<Frame>> {
        self.ensure_open()?;
        let info = self.transfer_info()?;
        let buffer_len = self.buffer_frames.max(1);
        // Frames older than one buffer length have been overwritten.
        let first = self.frames_read.max(info.frame_count - buffer_len);
        let mut frames = Vec::with_capacity((info.frame_count - first).max(0) as usize);
        for n in first..info.frame_count {
            frames.push(self.lock_frame(n % buffer_len)?);
        }
        self.frames_read = info.frame_count;
        Ok(frames)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let api = &self.runtime.api;
        // SAFETY: Handles are owned by this session and closed exactly once.
        unsafe {
            log_cleanup("dcamcap_stop", (api.cap_stop)(self.hdcam.0));
            log_cleanup(
                "dcambuf_release",
                (api.buf_release)(self.hdcam.0, DCAMBUF_ATTACHKIND_FRAME),
            );
            log_cleanup("dcamwait_close", (api.wait_close)(self.hwait.0));
        }
        // SAFETY: As above.
        let err = unsafe { (api.dev_close)(self.hdcam.0) };
        tracing::info!("DCAM camera closed");
        check("dcamdev_close", err).context("Failed to close DCAM device")
    }
}

impl Drop for DcamApiCamera {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Error closing DCAM camera on drop: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_negative() {
        assert!(failed(0x8000_0102_u32 as i32));
        assert!(!failed(1));
    }

    #[test]
    fn trigger_sources_are_distinct() {
        let values: Vec<f64> = [
            TriggerMode::Internal,
            TriggerMode::External,
            TriggerMode::Software,
            TriggerMode::MasterPulse,
        ]
        .into_iter()
        .map(trigger_source)
        .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn timeout_code_maps_to_timeout_kind() {
        let err = check("dcamwait_start", DCAMERR_TIMEOUT).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DriverError>().unwrap().kind,
            DriverErrorKind::Timeout
        );
        let err = check("dcamcap_start", 0x8000_0102_u32 as i32).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DriverError>().unwrap().kind,
            DriverErrorKind::Communication
        );
        assert!(check("dcamcap_stop", 1).is_ok());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_cleanup_calls_are_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_cleanup("dcamcap_stop", 1);
            log_cleanup("dcambuf_release", 0x8000_0102_u32 as i32);
        });

        let output = String::from_utf8(log.0.lock().clone()).unwrap();
        assert!(output.contains("dcambuf_release failed during close: 0x80000102"));
        assert!(!output.contains("dcamcap_stop"));
    }

    #[test]
    fn unknown_trigger_source_is_a_hardware_error() {
        assert_eq!(trigger_mode_from_source(4).unwrap(), TriggerMode::MasterPulse);
        let err = trigger_mode_from_source(9).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DriverError>().unwrap().kind,
            DriverErrorKind::Hardware
        );
    }

    #[test]
    fn capture_modes() {
        assert_eq!(capture_mode(AcquisitionMode::Snap), DCAMCAP_START_SNAP);
        assert_eq!(capture_mode(AcquisitionMode::Sequence), DCAMCAP_START_SEQUENCE);
    }

    #[test]
    #[serial_test::serial(dcamapi)]
    fn missing_runtime_fails_to_open() {
        let _registration = dll_path::register(dll_path::DCAMAPI, "/nonexistent/dcam");
        let err = DcamApiBackend::default().open().err().unwrap();
        let driver_err = err.downcast_ref::<DriverError>().unwrap();
        assert_eq!(driver_err.kind, DriverErrorKind::Initialization);
    }
}
