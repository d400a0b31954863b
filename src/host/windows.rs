//! Live backend over the Task Scheduler 2.0 COM API.

use chrono::NaiveDateTime;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::slice;

use winapi::shared::guiddef::GUID;
use winapi::shared::minwindef::{DWORD, UINT};
use winapi::shared::ntdef::LONG;
use winapi::shared::rpcdce::{RPC_C_AUTHN_LEVEL_PKT_PRIVACY, RPC_C_IMP_LEVEL_IMPERSONATE};
use winapi::shared::winerror::FAILED;
use winapi::shared::wtypes::{BSTR, DATE, VARIANT_BOOL, VARIANT_TRUE, VARTYPE, VT_I4};
use winapi::shared::wtypesbase::CLSCTX_INPROC_SERVER;
use winapi::um::combaseapi::{
    CoCreateInstance, CoInitializeEx, CoInitializeSecurity, CoUninitialize,
};
use winapi::um::consoleapi::GetConsoleOutputCP;
use winapi::um::oaidl::VARIANT;
use winapi::um::objbase::COINIT_MULTITHREADED;
use winapi::um::oleauto::{SysAllocStringLen, SysFreeString, SysStringLen};
use winapi::um::taskschd::{
    IAction, IActionCollection, IDailyTrigger, IExecAction, IMonthlyTrigger, IRegisteredTask,
    IRegisteredTaskCollection, IRegistrationInfo, IRepetitionPattern, ITaskDefinition,
    ITaskFolder, ITaskFolderCollection, ITaskService, ITrigger, ITriggerCollection,
    IWeeklyTrigger, TASK_ACTION_EXEC, TASK_ACTION_TYPE, TASK_ENUM_HIDDEN, TASK_STATE,
    TASK_TRIGGER_DAILY, TASK_TRIGGER_MONTHLY, TASK_TRIGGER_TYPE2, TASK_TRIGGER_WEEKLY,
};
use winapi::um::unknwnbase::IUnknown;
use winapi::um::wincon::SetConsoleOutputCP;
use winapi::um::winnls::CP_UTF8;
use winapi::um::winnt::HRESULT;
use winapi::Interface;

use super::{
    Action, ExecAction, HostError, HostResult, Listing, RegisteredTask, RepetitionPattern,
    Schedule, TaskDefinition, TaskFolder, TaskService, Trigger,
};
use crate::utils;

// {0F87369F-A4E5-4CFC-BD3E-73E6154572DD}
const CLSID_TASK_SCHEDULER: GUID = GUID {
    Data1: 0x0f87_369f,
    Data2: 0xa4e5,
    Data3: 0x4cfc,
    Data4: [0xbd, 0x3e, 0x73, 0xe6, 0x15, 0x45, 0x72, 0xdd],
};

const EOAC_NONE: DWORD = 0;

fn check(call: &'static str, hr: HRESULT) -> HostResult<()> {
    if FAILED(hr) {
        Err(HostError::Call { call, code: hr })
    } else {
        Ok(())
    }
}

/// Owning interface pointer, released on drop.
struct ComPtr<T: Interface>(NonNull<T>);

impl<T: Interface> ComPtr<T> {
    /// Takes ownership of a reference the callee already added.
    unsafe fn from_raw(raw: *mut T) -> Option<Self> {
        NonNull::new(raw).map(ComPtr)
    }

    fn as_unknown(&self) -> &IUnknown {
        unsafe { &*(self.0.as_ptr() as *mut IUnknown) }
    }

    fn cast<U: Interface>(&self) -> HostResult<ComPtr<U>> {
        let mut raw = ptr::null_mut();
        check("QueryInterface", unsafe {
            self.as_unknown().QueryInterface(&U::uuidof(), &mut raw)
        })?;
        unsafe { ComPtr::from_raw(raw as *mut U) }.ok_or(HostError::Empty {
            call: "QueryInterface",
        })
    }
}

impl<T: Interface> Deref for ComPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.0.as_ref() }
    }
}

impl<T: Interface> Drop for ComPtr<T> {
    fn drop(&mut self) {
        unsafe {
            self.as_unknown().Release();
        }
    }
}

struct Bstr(BSTR);

impl Bstr {
    fn new(text: &str) -> HostResult<Bstr> {
        let wide: Vec<u16> = text.encode_utf16().collect();
        let raw = unsafe { SysAllocStringLen(wide.as_ptr(), wide.len() as UINT) };
        if raw.is_null() {
            Err(HostError::Empty {
                call: "SysAllocStringLen",
            })
        } else {
            Ok(Bstr(raw))
        }
    }

    fn to_string_lossy(&self) -> String {
        let len = unsafe { SysStringLen(self.0) } as usize;
        String::from_utf16_lossy(unsafe { slice::from_raw_parts(self.0, len) })
    }
}

impl Drop for Bstr {
    fn drop(&mut self) {
        unsafe { SysFreeString(self.0) }
    }
}

fn read<T: Default>(call: &'static str, getter: impl FnOnce(*mut T) -> HRESULT) -> HostResult<T> {
    let mut value = T::default();
    check(call, getter(&mut value))?;
    Ok(value)
}

/// A null string is a successful read of "no value".
fn read_text(
    call: &'static str,
    getter: impl FnOnce(*mut BSTR) -> HRESULT,
) -> HostResult<Option<String>> {
    let mut raw: BSTR = ptr::null_mut();
    check(call, getter(&mut raw))?;
    if raw.is_null() {
        return Ok(None);
    }
    Ok(Some(Bstr(raw).to_string_lossy()))
}

fn read_flag(
    call: &'static str,
    getter: impl FnOnce(*mut VARIANT_BOOL) -> HRESULT,
) -> HostResult<bool> {
    read(call, getter).map(|flag| flag == VARIANT_TRUE)
}

fn read_date(
    call: &'static str,
    getter: impl FnOnce(*mut DATE) -> HRESULT,
) -> HostResult<NaiveDateTime> {
    let date = read(call, getter)?;
    utils::ole_date_to_datetime(date).ok_or(HostError::DateOutOfRange(date))
}

fn read_object<T: Interface>(
    call: &'static str,
    getter: impl FnOnce(*mut *mut T) -> HRESULT,
) -> HostResult<ComPtr<T>> {
    let mut raw = ptr::null_mut();
    check(call, getter(&mut raw))?;
    unsafe { ComPtr::from_raw(raw) }.ok_or(HostError::Empty { call })
}

fn index_variant(index: LONG) -> VARIANT {
    unsafe {
        let mut variant: VARIANT = mem::zeroed();
        let inner = variant.n1.n2_mut();
        inner.vt = VT_I4 as VARTYPE;
        *inner.n3.lVal_mut() = index;
        variant
    }
}

/// COM initialized for this thread; uninitialized on drop.
struct Apartment;

impl Apartment {
    fn enter() -> HostResult<Apartment> {
        check("CoInitializeEx", unsafe {
            CoInitializeEx(ptr::null_mut(), COINIT_MULTITHREADED)
        })?;
        let apartment = Apartment;
        check("CoInitializeSecurity", unsafe {
            CoInitializeSecurity(
                ptr::null_mut(),
                -1,
                ptr::null_mut(),
                ptr::null_mut(),
                RPC_C_AUTHN_LEVEL_PKT_PRIVACY,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                ptr::null_mut(),
                EOAC_NONE,
                ptr::null_mut(),
            )
        })?;
        Ok(apartment)
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() }
    }
}

/// Switches the console to UTF-8 and restores the previous code page.
struct ConsoleCodePage(UINT);

impl ConsoleCodePage {
    fn utf8() -> ConsoleCodePage {
        let saved = unsafe { GetConsoleOutputCP() };
        unsafe { SetConsoleOutputCP(CP_UTF8) };
        ConsoleCodePage(saved)
    }
}

impl Drop for ConsoleCodePage {
    fn drop(&mut self) {
        // 0 means there was no console to begin with.
        if self.0 != 0 {
            unsafe { SetConsoleOutputCP(self.0) };
        }
    }
}

// Fields drop in order: the service is released before COM goes away.
pub struct ComTaskService {
    service: ComPtr<ITaskService>,
    _console: ConsoleCodePage,
    _apartment: Apartment,
}

impl ComTaskService {
    /// Connects to the local service as the current user.
    pub fn connect() -> HostResult<ComTaskService> {
        let apartment = Apartment::enter()?;

        let service: ComPtr<ITaskService> = read_object("CoCreateInstance", |raw| unsafe {
            CoCreateInstance(
                &CLSID_TASK_SCHEDULER,
                ptr::null_mut(),
                CLSCTX_INPROC_SERVER,
                &ITaskService::uuidof(),
                raw as *mut *mut _,
            )
        })?;

        let empty: VARIANT = unsafe { mem::zeroed() };
        check("ITaskService::Connect", unsafe {
            service.Connect(empty, empty, empty, empty)
        })?;

        Ok(ComTaskService {
            service,
            _console: ConsoleCodePage::utf8(),
            _apartment: apartment,
        })
    }
}

impl TaskService for ComTaskService {
    fn folder(&self, path: &str) -> HostResult<Box<dyn TaskFolder + '_>> {
        let path = Bstr::new(path)?;
        let folder = read_object("ITaskService::GetFolder", |raw| unsafe {
            self.service.GetFolder(path.0, raw)
        })?;
        Ok(Box::new(ComTaskFolder { folder }))
    }
}

struct ComTaskFolder {
    folder: ComPtr<ITaskFolder>,
}

impl TaskFolder for ComTaskFolder {
    fn path(&self) -> HostResult<String> {
        read_text("ITaskFolder::get_Path", |raw| unsafe { self.folder.get_Path(raw) })?
            .ok_or(HostError::Empty {
                call: "ITaskFolder::get_Path",
            })
    }

    fn tasks(&self, include_hidden: bool) -> Listing<Box<dyn RegisteredTask + '_>> {
        let flags = if include_hidden { TASK_ENUM_HIDDEN as LONG } else { 0 };
        let tasks: ComPtr<IRegisteredTaskCollection> =
            read_object("ITaskFolder::GetTasks", |raw| unsafe {
                self.folder.GetTasks(flags, raw)
            })?;
        // An uncountable collection lists nothing; subfolders are still walked.
        let count: LONG = match read("IRegisteredTaskCollection::get_Count", |raw| unsafe {
            tasks.get_Count(raw)
        }) {
            Ok(count) => count,
            Err(_) => return Ok(Vec::new()),
        };

        Ok((1..=count)
            .map(|index| {
                read_object("IRegisteredTaskCollection::get_Item", |raw| unsafe {
                    tasks.get_Item(index_variant(index), raw)
                })
                .map(|task| Box::new(ComRegisteredTask { task }) as Box<dyn RegisteredTask + '_>)
            })
            .collect())
    }

    fn subfolders(&self) -> Listing<Box<dyn TaskFolder + '_>> {
        let folders: ComPtr<ITaskFolderCollection> =
            read_object("ITaskFolder::GetFolders", |raw| unsafe {
                self.folder.GetFolders(0, raw)
            })?;
        let count: LONG = read("ITaskFolderCollection::get_Count", |raw| unsafe {
            folders.get_Count(raw)
        })?;

        Ok((1..=count)
            .map(|index| {
                read_object("ITaskFolderCollection::get_Item", |raw| unsafe {
                    folders.get_Item(index_variant(index), raw)
                })
                .map(|folder| Box::new(ComTaskFolder { folder }) as Box<dyn TaskFolder + '_>)
            })
            .collect())
    }

    fn task(&self, name: &str) -> HostResult<Box<dyn RegisteredTask + '_>> {
        let name = Bstr::new(name)?;
        let task = read_object("ITaskFolder::GetTask", |raw| unsafe {
            self.folder.GetTask(name.0, raw)
        })?;
        Ok(Box::new(ComRegisteredTask { task }))
    }
}

struct ComRegisteredTask {
    task: ComPtr<IRegisteredTask>,
}

impl RegisteredTask for ComRegisteredTask {
    fn name(&self) -> HostResult<String> {
        read_text("IRegisteredTask::get_Name", |raw| unsafe { self.task.get_Name(raw) })?
            .ok_or(HostError::Empty {
                call: "IRegisteredTask::get_Name",
            })
    }

    fn state(&self) -> HostResult<i32> {
        read::<TASK_STATE>("IRegisteredTask::get_State", |raw| unsafe {
            self.task.get_State(raw)
        })
        .map(|state| state as i32)
    }

    fn last_run_time(&self) -> HostResult<NaiveDateTime> {
        read_date("IRegisteredTask::get_LastRunTime", |raw| unsafe {
            self.task.get_LastRunTime(raw)
        })
    }

    fn next_run_time(&self) -> HostResult<NaiveDateTime> {
        read_date("IRegisteredTask::get_NextRunTime", |raw| unsafe {
            self.task.get_NextRunTime(raw)
        })
    }

    fn last_task_result(&self) -> HostResult<i32> {
        read::<LONG>("IRegisteredTask::get_LastTaskResult", |raw| unsafe {
            self.task.get_LastTaskResult(raw)
        })
    }

    fn definition(&self) -> HostResult<Box<dyn TaskDefinition + '_>> {
        let definition = read_object("IRegisteredTask::get_Definition", |raw| unsafe {
            self.task.get_Definition(raw)
        })?;
        Ok(Box::new(ComTaskDefinition { definition }))
    }
}

struct ComTaskDefinition {
    definition: ComPtr<ITaskDefinition>,
}

impl TaskDefinition for ComTaskDefinition {
    fn description(&self) -> HostResult<Option<String>> {
        let info: ComPtr<IRegistrationInfo> =
            read_object("ITaskDefinition::get_RegistrationInfo", |raw| unsafe {
                self.definition.get_RegistrationInfo(raw)
            })?;
        read_text("IRegistrationInfo::get_Description", |raw| unsafe {
            info.get_Description(raw)
        })
    }

    fn actions(&self) -> Listing<Action> {
        let actions: ComPtr<IActionCollection> =
            read_object("ITaskDefinition::get_Actions", |raw| unsafe {
                self.definition.get_Actions(raw)
            })?;
        let count: LONG = read("IActionCollection::get_Count", |raw| unsafe {
            actions.get_Count(raw)
        })?;

        Ok((1..=count)
            .map(|index| {
                let action: ComPtr<IAction> =
                    read_object("IActionCollection::get_Item", |raw| unsafe {
                        actions.get_Item(index, raw)
                    })?;
                read_action(&action)
            })
            .collect())
    }

    fn triggers(&self) -> Listing<Trigger> {
        let triggers: ComPtr<ITriggerCollection> =
            read_object("ITaskDefinition::get_Triggers", |raw| unsafe {
                self.definition.get_Triggers(raw)
            })?;
        let count: LONG = read("ITriggerCollection::get_Count", |raw| unsafe {
            triggers.get_Count(raw)
        })?;

        Ok((1..=count)
            .map(|index| {
                let trigger: ComPtr<ITrigger> =
                    read_object("ITriggerCollection::get_Item", |raw| unsafe {
                        triggers.get_Item(index, raw)
                    })?;
                Ok(read_trigger(&trigger))
            })
            .collect())
    }
}

fn read_action(action: &ComPtr<IAction>) -> HostResult<Action> {
    let kind: TASK_ACTION_TYPE = read("IAction::get_Type", |raw| unsafe { action.get_Type(raw) })?;
    if kind != TASK_ACTION_EXEC {
        return Ok(Action::Other { kind: kind as i32 });
    }

    let exec = action.cast::<IExecAction>()?;
    Ok(Action::Exec(ExecAction {
        path: read_text("IExecAction::get_Path", |raw| unsafe { exec.get_Path(raw) })
            .ok()
            .flatten(),
        arguments: read_text("IExecAction::get_Arguments", |raw| unsafe {
            exec.get_Arguments(raw)
        })
        .ok()
        .flatten(),
        working_directory: read_text("IExecAction::get_WorkingDirectory", |raw| unsafe {
            exec.get_WorkingDirectory(raw)
        })
        .ok()
        .flatten(),
    }))
}

fn read_trigger(trigger: &ComPtr<ITrigger>) -> Trigger {
    Trigger {
        start_boundary: read_text("ITrigger::get_StartBoundary", |raw| unsafe {
            trigger.get_StartBoundary(raw)
        })
        .ok()
        .flatten(),
        enabled: read_flag("ITrigger::get_Enabled", |raw| unsafe { trigger.get_Enabled(raw) })
            .ok(),
        schedule: read_schedule(trigger),
        repetition: read_object("ITrigger::get_Repetition", |raw| unsafe {
            trigger.get_Repetition(raw)
        })
        .ok()
        .map(|pattern| read_repetition(&pattern)),
    }
}

fn read_schedule(trigger: &ComPtr<ITrigger>) -> Option<Schedule> {
    let kind: TASK_TRIGGER_TYPE2 =
        read("ITrigger::get_Type", |raw| unsafe { trigger.get_Type(raw) }).ok()?;

    match kind {
        TASK_TRIGGER_DAILY => {
            let daily = trigger.cast::<IDailyTrigger>().ok()?;
            Some(Schedule::Daily {
                days_interval: read("IDailyTrigger::get_DaysInterval", |raw| unsafe {
                    daily.get_DaysInterval(raw)
                })
                .ok(),
            })
        }
        TASK_TRIGGER_WEEKLY => {
            let weekly = trigger.cast::<IWeeklyTrigger>().ok()?;
            Some(Schedule::Weekly {
                weeks_interval: read("IWeeklyTrigger::get_WeeksInterval", |raw| unsafe {
                    weekly.get_WeeksInterval(raw)
                })
                .ok(),
                days_of_week: read("IWeeklyTrigger::get_DaysOfWeek", |raw| unsafe {
                    weekly.get_DaysOfWeek(raw)
                })
                .ok(),
            })
        }
        TASK_TRIGGER_MONTHLY => {
            let monthly = trigger.cast::<IMonthlyTrigger>().ok()?;
            Some(Schedule::Monthly {
                days_of_month: read("IMonthlyTrigger::get_DaysOfMonth", |raw| unsafe {
                    monthly.get_DaysOfMonth(raw)
                })
                .ok(),
                months_of_year: read("IMonthlyTrigger::get_MonthsOfYear", |raw| unsafe {
                    monthly.get_MonthsOfYear(raw)
                })
                .ok(),
                run_on_last_day_of_month: read_flag(
                    "IMonthlyTrigger::get_RunOnLastDayOfMonth",
                    |raw| unsafe { monthly.get_RunOnLastDayOfMonth(raw) },
                )
                .ok(),
            })
        }
        _ => None,
    }
}

fn read_repetition(pattern: &ComPtr<IRepetitionPattern>) -> RepetitionPattern {
    RepetitionPattern {
        interval: read_text("IRepetitionPattern::get_Interval", |raw| unsafe {
            pattern.get_Interval(raw)
        })
        .ok()
        .flatten(),
        duration: read_text("IRepetitionPattern::get_Duration", |raw| unsafe {
            pattern.get_Duration(raw)
        })
        .ok()
        .flatten(),
        stop_at_duration_end: read_flag("IRepetitionPattern::get_StopAtDurationEnd", |raw| unsafe {
            pattern.get_StopAtDurationEnd(raw)
        })
        .ok(),
    }
}
