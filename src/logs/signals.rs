use regex::Regex;
use std::sync::LazyLock;

static TICK_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LogSquad: USQGameState: Server Tick Rate: (?P<tick_rate>[0-9]+(?:\.[0-9]+)?)")
        .expect("tick rate regex")
});

static ROUND_ENDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LogGameState: Match State Changed from InProgress to WaitingPostMatch")
        .expect("round ended regex")
});

static NEW_PLAYER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"LogSquad: PostLogin: NewPlayer: \S+ .*?PersistentLevel\.(?P<controller>\S+)")
        .expect("new player regex")
});

/// Server lifecycle signals the supervisor reacts to, besides capture events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerSignal {
    TickRate(f64),
    RoundEnded,
    /// Player controller name from the `PostLogin` line.
    PlayerConnected(String),
}

pub fn parse_signal(line: &str) -> Option<ServerSignal> {
    if let Some(caps) = TICK_RATE.captures(line) {
        return caps["tick_rate"].parse().ok().map(ServerSignal::TickRate);
    }
    if ROUND_ENDED.is_match(line) {
        return Some(ServerSignal::RoundEnded);
    }
    NEW_PLAYER
        .captures(line)
        .map(|caps| ServerSignal::PlayerConnected(caps["controller"].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_rate_line() {
        let line = "[2024.05.01-18.22.10:123][412]LogSquad: USQGameState: Server Tick Rate: 49.87";
        assert_eq!(parse_signal(line), Some(ServerSignal::TickRate(49.87)));
    }

    #[test]
    fn round_end_line() {
        let line = "[2024.05.01-19.01.02:000][  7]LogGameState: Match State Changed from InProgress to WaitingPostMatch";
        assert_eq!(parse_signal(line), Some(ServerSignal::RoundEnded));
    }

    #[test]
    fn player_connected_lines() {
        let post_login = "[2024.05.01-18.00.00:001][ 12]LogSquad: PostLogin: NewPlayer: BP_PlayerController_C /Game/Maps/Narva/Gameplay_Layers/Narva_RAAS_v1.Narva_RAAS_v1:PersistentLevel.BP_PlayerController_C_2130401015 (IP: 10.0.0.7 | Online IDs: EOS: 0002a1 steam: 76561198000000001)";
        assert_eq!(
            parse_signal(post_login),
            Some(ServerSignal::PlayerConnected("BP_PlayerController_C_2130401015".into()))
        );

        // logged for the same join; only PostLogin counts
        let join = "[2024.05.01-18.00.00:002][ 12]LogNet: Join succeeded: Alpha";
        assert_eq!(parse_signal(join), None);
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        assert_eq!(parse_signal("LogCsvProfiler: Display: Capture Started. CSV ID: ABC"), None);
        assert_eq!(parse_signal("LogGameState: Match State Changed from WaitingToStart to InProgress"), None);
        assert_eq!(parse_signal(""), None);
    }
}
