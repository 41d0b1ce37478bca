use super::*;

#[test]
fn test_state_ordering() {
    assert!(ComponentState::Constructed < ComponentState::Initializing);
    assert!(ComponentState::Initializing < ComponentState::Ready);
    assert!(ComponentState::Ready < ComponentState::Active);
    assert!(ComponentState::Active < ComponentState::Finishing);
    assert!(ComponentState::Finishing < ComponentState::Finished);
}

#[test]
fn test_state_terminal() {
    assert!(!ComponentState::Active.is_terminal());
    assert!(ComponentState::Finishing.is_terminal());
    assert!(ComponentState::Finished.is_terminal());
}

#[test]
fn test_state_default() {
    assert_eq!(ComponentState::default(), ComponentState::Constructed);
}

#[test]
fn test_state_from_u8() {
    for state in ComponentState::ALL {
        assert_eq!(ComponentState::from(state as u8), state);
    }
    assert_eq!(ComponentState::from(200), ComponentState::Finished);
}

#[test]
fn test_state_parse() {
    assert_eq!("ready".parse::<ComponentState>().unwrap(), ComponentState::Ready);
    assert_eq!(" ACTIVE ".parse::<ComponentState>().unwrap(), ComponentState::Active);
    assert!("sleeping".parse::<ComponentState>().is_err());
}

#[test]
fn test_state_serialization() {
    let json = serde_json::to_string(&ComponentState::Finishing).unwrap();
    assert_eq!(json, "\"FINISHING\"");

    let parsed: ComponentState = serde_json::from_str("\"INITIALIZING\"").unwrap();
    assert_eq!(parsed, ComponentState::Initializing);
}
