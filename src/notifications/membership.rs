use crate::{
    error::BuildError,
    models::{notification::Alert, room::RoomMember},
};

/// Template prefix for a room membership notification, e.g. `join_room_with`
/// or `join_named_room_with`.
pub fn room_key(verb: &str, named: bool) -> String {
    if named {
        format!("{}_named_room_with", verb)
    } else {
        format!("{}_room_with", verb)
    }
}

/// Orders room members so that `actor` leads, followed by everyone else in
/// room order. Returns `None` when the actor is not in the room.
pub fn lead_with(members: &[RoomMember], actor: i64) -> Option<Vec<&RoomMember>> {
    let position = members.iter().position(|member| member.id == actor)?;

    let mut ordered = Vec::with_capacity(members.len());
    ordered.push(&members[position]);
    ordered.extend(
        members
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != position)
            .map(|(_, member)| member),
    );

    Some(ordered)
}

/// Builds a size-dependent alert:
///
/// | count | key                      | arguments                     |
/// |-------|--------------------------|-------------------------------|
/// | 1     | `<prefix>_1`             | `[n0]`                        |
/// | 2     | `<prefix>_2`             | `[n0, n1]`                    |
/// | 3     | `<prefix>_3`             | `[n0, n1, n2]`                |
/// | > 3   | `<prefix>_3_and_more`    | `[n0, n1, n2, count - 3]`     |
///
/// `leading` is prepended to the arguments when present (the room name for
/// named rooms). `count` may exceed `names.len()`; missing names fail the
/// build rather than producing a short argument list.
pub fn pluralize(
    prefix: &str,
    leading: Option<&str>,
    names: &[&str],
    count: usize,
) -> Result<Alert, BuildError> {
    let shown = count.min(3);

    if count == 0 || names.len() < shown {
        return Err(BuildError::NotEnoughMembers {
            expected: shown.max(1),
            found: names.len(),
        });
    }

    let mut arguments: Vec<String> = leading.map(str::to_string).into_iter().collect();
    arguments.extend(names[..shown].iter().map(|name| name.to_string()));

    let key = if count > 3 {
        arguments.push((count - 3).to_string());
        format!("{}_3_and_more", prefix)
    } else {
        format!("{}_{}", prefix, count)
    };

    Ok(Alert::new(key, arguments))
}
