use super::PermissionAdapter;
use crate::{Error, Platform, Result};
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::Path;
use std::ptr::{null, null_mut};
use tracing::warn;
use windows_sys::Win32::Foundation::{ERROR_SUCCESS, HANDLE, LocalFree};
use windows_sys::Win32::Security::Authorization::{
    DENY_ACCESS, EXPLICIT_ACCESS_W, GRANT_ACCESS, GetNamedSecurityInfoW, NO_MULTIPLE_TRUSTEE,
    SE_FILE_OBJECT, SetEntriesInAclW, SetNamedSecurityInfoW, TRUSTEE_IS_SID, TRUSTEE_IS_UNKNOWN,
    TRUSTEE_IS_USER, TRUSTEE_TYPE, TRUSTEE_W,
};
use windows_sys::Win32::Security::{
    ACCESS_ALLOWED_ACE, ACE_HEADER, ACL, ACL_SIZE_INFORMATION, AclSizeInformation,
    DACL_SECURITY_INFORMATION, EqualSid, GetAce, GetAclInformation, GetSecurityDescriptorDacl,
    GetTokenInformation, NO_INHERITANCE, PROTECTED_DACL_SECURITY_INFORMATION,
    SUB_CONTAINERS_AND_OBJECTS_INHERIT, TOKEN_QUERY, TOKEN_USER, TokenUser,
};
use windows_sys::Win32::System::SystemServices::{ACCESS_ALLOWED_ACE_TYPE, ACCESS_DENIED_ACE_TYPE};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// The running user's entry in an object's discretionary ACL.
///
/// Reading returns the access mask of the first allow or deny ACE whose SID
/// is the process token's user. Applying rebuilds the DACL: every other
/// identity's ACEs are carried over, the user's own ACEs are replaced by a
/// single grant, and the result is installed as a protected DACL.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsAcl;

impl PermissionAdapter for WindowsAcl {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn read_current(&self, path: &Path) -> Result<u32> {
        let fail = |reason: String| Error::PermissionRead {
            path: path.to_path_buf(),
            reason,
        };

        let user = CurrentUser::query().map_err(fail)?;
        let security = SecurityInfo::fetch(&wide_path(path)).map_err(fail)?;
        if !security.dacl_present {
            return Err(fail("no DACL present".to_string()));
        }

        security
            .aces()
            .map_err(fail)?
            .into_iter()
            .find(|ace| user.matches(ace.sid))
            .map(|ace| ace.mask)
            .ok_or_else(|| fail("no access control entry for the current user".to_string()))
    }

    fn apply(&self, path: &Path, rights: u32, is_directory: bool) -> Result<()> {
        let fail = |reason: String| Error::PermissionApply {
            path: path.to_path_buf(),
            reason,
        };

        let mut wide = wide_path(path);
        let user = CurrentUser::query().map_err(fail)?;
        let security = SecurityInfo::fetch(&wide).map_err(fail)?;

        let inheritance = if is_directory {
            SUB_CONTAINERS_AND_OBJECTS_INHERIT
        } else {
            NO_INHERITANCE
        };

        let mut entries: Vec<EXPLICIT_ACCESS_W> = security
            .aces()
            .map_err(fail)?
            .into_iter()
            .filter(|ace| !user.matches(ace.sid))
            .map(|ace| EXPLICIT_ACCESS_W {
                grfAccessPermissions: ace.mask,
                grfAccessMode: if ace.allowed { GRANT_ACCESS } else { DENY_ACCESS },
                grfInheritance: inheritance,
                Trustee: sid_trustee(ace.sid, TRUSTEE_IS_UNKNOWN),
            })
            .collect();

        entries.push(EXPLICIT_ACCESS_W {
            grfAccessPermissions: rights,
            grfAccessMode: GRANT_ACCESS,
            grfInheritance: inheritance,
            Trustee: sid_trustee(user.sid(), TRUSTEE_IS_USER),
        });

        let mut new_acl: *mut ACL = null_mut();
        let status = unsafe {
            SetEntriesInAclW(entries.len() as u32, entries.as_ptr(), null(), &mut new_acl)
        };
        if status != ERROR_SUCCESS {
            return Err(fail(format!("SetEntriesInAclW failed: error {}", status)));
        }
        let _new_acl = LocalMemory(new_acl.cast());

        let status = unsafe {
            SetNamedSecurityInfoW(
                wide.as_mut_ptr(),
                SE_FILE_OBJECT,
                DACL_SECURITY_INFORMATION | PROTECTED_DACL_SECURITY_INFORMATION,
                null_mut(),
                null_mut(),
                new_acl,
                null(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(fail(format!("SetNamedSecurityInfoW failed: error {}", status)));
        }

        Ok(())
    }
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(Some(0)).collect()
}

fn sid_trustee(sid: *mut c_void, trustee_type: TRUSTEE_TYPE) -> TRUSTEE_W {
    TRUSTEE_W {
        pMultipleTrustee: null_mut(),
        MultipleTrusteeOperation: NO_MULTIPLE_TRUSTEE,
        TrusteeForm: TRUSTEE_IS_SID,
        TrusteeType: trustee_type,
        ptstrName: sid.cast(),
    }
}

fn last_error(call: &str) -> String {
    format!("{} failed: {}", call, std::io::Error::last_os_error())
}

/// Memory returned by the security APIs, released with `LocalFree`.
struct LocalMemory(*mut c_void);

impl Drop for LocalMemory {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                LocalFree(self.0);
            }
        }
    }
}

/// `TOKEN_USER` of the running process.
struct CurrentUser {
    // u64 words keep the embedded SID pointer aligned.
    buffer: Vec<u64>,
}

impl CurrentUser {
    fn query() -> std::result::Result<Self, String> {
        let mut raw: HANDLE = null_mut();
        if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut raw) } == 0 {
            return Err(last_error("OpenProcessToken"));
        }
        let token = unsafe { OwnedHandle::from_raw_handle(raw) };

        let mut len = 0u32;
        unsafe {
            GetTokenInformation(token.as_raw_handle(), TokenUser, null_mut(), 0, &mut len);
        }
        if len == 0 {
            return Err(last_error("GetTokenInformation"));
        }

        let mut buffer = vec![0u64; (len as usize).div_ceil(8)];
        let ok = unsafe {
            GetTokenInformation(
                token.as_raw_handle(),
                TokenUser,
                buffer.as_mut_ptr().cast(),
                len,
                &mut len,
            )
        };
        if ok == 0 {
            return Err(last_error("GetTokenInformation"));
        }

        Ok(Self { buffer })
    }

    fn sid(&self) -> *mut c_void {
        unsafe { (*self.buffer.as_ptr().cast::<TOKEN_USER>()).User.Sid }
    }

    fn matches(&self, sid: *mut c_void) -> bool {
        unsafe { EqualSid(sid, self.sid()) != 0 }
    }
}

struct Ace {
    allowed: bool,
    mask: u32,
    // Points into the owning SecurityInfo's descriptor.
    sid: *mut c_void,
}

struct SecurityInfo {
    _descriptor: LocalMemory,
    dacl: *mut ACL,
    dacl_present: bool,
}

impl SecurityInfo {
    fn fetch(wide_path: &[u16]) -> std::result::Result<Self, String> {
        let mut dacl: *mut ACL = null_mut();
        let mut descriptor: *mut c_void = null_mut();
        let status = unsafe {
            GetNamedSecurityInfoW(
                wide_path.as_ptr(),
                SE_FILE_OBJECT,
                DACL_SECURITY_INFORMATION,
                null_mut(),
                null_mut(),
                &mut dacl,
                null_mut(),
                &mut descriptor,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(format!("GetNamedSecurityInfoW failed: error {}", status));
        }
        let descriptor = LocalMemory(descriptor);

        let mut present = 0;
        let mut defaulted = 0;
        let ok = unsafe {
            GetSecurityDescriptorDacl(descriptor.0, &mut present, &mut dacl, &mut defaulted)
        };
        if ok == 0 {
            return Err(last_error("GetSecurityDescriptorDacl"));
        }

        Ok(Self {
            _descriptor: descriptor,
            dacl,
            dacl_present: present != 0,
        })
    }

    /// Allow and deny ACEs in DACL order. Other ACE types cannot be carried
    /// through `SetEntriesInAclW` and are left out.
    fn aces(&self) -> std::result::Result<Vec<Ace>, String> {
        if self.dacl.is_null() {
            return Ok(Vec::new());
        }

        let mut info = ACL_SIZE_INFORMATION {
            AceCount: 0,
            AclBytesInUse: 0,
            AclBytesFree: 0,
        };
        let ok = unsafe {
            GetAclInformation(
                self.dacl,
                (&mut info as *mut ACL_SIZE_INFORMATION).cast(),
                std::mem::size_of::<ACL_SIZE_INFORMATION>() as u32,
                AclSizeInformation,
            )
        };
        if ok == 0 {
            return Err(last_error("GetAclInformation"));
        }

        let mut aces = Vec::with_capacity(info.AceCount as usize);
        for index in 0..info.AceCount {
            let mut raw: *mut c_void = null_mut();
            if unsafe { GetAce(self.dacl, index, &mut raw) } == 0 {
                warn!("GetAce failed for index {}: {}", index, std::io::Error::last_os_error());
                continue;
            }

            let ace_type = u32::from(unsafe { (*raw.cast::<ACE_HEADER>()).AceType });
            if ace_type != ACCESS_ALLOWED_ACE_TYPE && ace_type != ACCESS_DENIED_ACE_TYPE {
                warn!("Skipping unsupported ACE type {} at index {}", ace_type, index);
                continue;
            }

            // Allow and deny ACEs share one layout: header, mask, SID.
            let ace = raw.cast::<ACCESS_ALLOWED_ACE>();
            let (mask, sid) = unsafe {
                (
                    (*ace).Mask,
                    std::ptr::addr_of_mut!((*ace).SidStart).cast::<c_void>(),
                )
            };
            aces.push(Ace {
                allowed: ace_type == ACCESS_ALLOWED_ACE_TYPE,
                mask,
                sid,
            });
        }

        Ok(aces)
    }
}
