//! Common assertions for dropbind testing

use crate::Call;

/// Bytes carried by start and append calls, concatenated in call order
pub fn sent_bytes(calls: &[Call]) -> Vec<u8> {
    calls
        .iter()
        .flat_map(|call| match call {
            Call::Start { body } | Call::Append { body, .. } => body.as_slice(),
            _ => &[],
        })
        .copied()
        .collect()
}

/// Asserts that `calls` form one well-ordered upload session
///
/// One start first, appends at contiguous offsets, and exactly one finish
/// last, at the total offset.
pub fn assert_single_session(calls: &[Call]) {
    let uploads: Vec<&Call> = calls
        .iter()
        .filter(|call| !matches!(call, Call::Download { .. }))
        .collect();

    assert!(
        matches!(uploads.first(), Some(Call::Start { .. })),
        "Session must begin with a start call: {:?}",
        uploads
    );
    assert!(
        matches!(uploads.last(), Some(Call::Finish { .. })),
        "Session must end with a finish call: {:?}",
        uploads
    );

    let mut expected = 0u64;
    for call in &uploads {
        match call {
            Call::Start { body } => expected = body.len() as u64,
            Call::Append { offset, body, .. } => {
                assert_eq!(*offset, expected, "Append at wrong offset");
                expected += body.len() as u64;
            }
            Call::Finish { offset, .. } => {
                assert_eq!(*offset, expected, "Finish at wrong offset");
            }
            Call::Download { .. } => {}
        }
    }

    let starts = uploads.iter().filter(|c| matches!(c, Call::Start { .. })).count();
    let finishes = uploads.iter().filter(|c| matches!(c, Call::Finish { .. })).count();
    assert_eq!(starts, 1, "Expected exactly one start call");
    assert_eq!(finishes, 1, "Expected exactly one finish call");
}
