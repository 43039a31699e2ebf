//! Utility functions for filenames, response headers and disk space

use std::path::Path;

/// Filename used when a title sanitizes to nothing
pub const FALLBACK_FILENAME: &str = "download";

/// Longest filename stem kept from a media title (in characters)
const MAX_STEM_CHARS: usize = 180;

/// Turn a media title into a safe filename stem
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`, runs of whitespace collapse to one space and leading
/// or trailing dots and spaces are dropped. Titles that end up empty become
/// [`FALLBACK_FILENAME`].
///
/// # Examples
///
/// ```
/// use media_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC: Live  at  Donington"), "AC_DC_ Live at Donington");
/// assert_eq!(sanitize_filename("..."), "download");
/// ```
pub fn sanitize_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_space = false;

    for c in title.chars() {
        let c = match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => continue,
            c if c.is_whitespace() => ' ',
            c => c,
        };

        if c == ' ' {
            if last_space {
                continue;
            }
            last_space = true;
        } else {
            last_space = false;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c == ' ');
    let stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end_matches([' ', '.']);

    if stem.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        stem.to_string()
    }
}

/// Build a `Content-Disposition: attachment` value for `filename`
///
/// Carries a quoted ASCII fallback plus an RFC 5987 `filename*` parameter so
/// non-ASCII titles survive.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

/// Free space available to unprivileged users on the filesystem holding `path`
///
/// Uses `statvfs` on unix and `GetDiskFreeSpaceExW` on Windows.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zeroed before
        // the call and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[allow(clippy::unnecessary_cast)]
            Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out pointer refers to a
        // live, aligned u64 that is only read after the call succeeds.
        unsafe {
            let mut available: u64 = 0;
            let mut total: u64 = 0;
            let mut total_free: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut available as *mut u64 as *mut _,
                &mut total as *mut u64 as *mut _,
                &mut total_free as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }
            Ok(available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}
