use crate::analytics::keys::readback_len;
use crate::error::{ClickError, ClickResult};
use crate::models::ClickStat;

/// Map read-back values, in site-op order, onto a [`ClickStat`].
///
/// A short read-back is an error; missing values are never filled with zeros.
pub fn assemble(values: &[u64], track_ip: bool) -> ClickResult<ClickStat> {
    let expected = readback_len(track_ip);
    if values.len() < expected {
        return Err(ClickError::IncompleteReadback {
            expected,
            got: values.len(),
        });
    }

    Ok(ClickStat {
        uri: values[0],
        total: values[1],
        browser_family: values[2],
        browser: values[3],
        os: values[4],
        platform: values[5],
        ip: track_ip.then(|| values[6]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_with_ip() {
        let stat = assemble(&[3, 10, 4, 2, 5, 6, 1], true).unwrap();
        assert_eq!(
            stat,
            ClickStat {
                uri: 3,
                total: 10,
                browser_family: 4,
                browser: 2,
                os: 5,
                platform: 6,
                ip: Some(1),
            }
        );
    }

    #[test]
    fn test_assemble_without_ip() {
        let stat = assemble(&[1, 1, 1, 1, 1, 1], false).unwrap();
        assert_eq!(stat.ip, None);
    }

    #[test]
    fn test_short_readback_is_not_padded() {
        let err = assemble(&[1, 1, 1, 1, 1, 1], true).unwrap_err();
        assert!(matches!(
            err,
            ClickError::IncompleteReadback {
                expected: 7,
                got: 6
            }
        ));

        assert!(matches!(
            assemble(&[], false),
            Err(ClickError::IncompleteReadback { got: 0, .. })
        ));
    }
}
